//! Fills empty input text on editable targets before an `Operation`
//! leaves the crate. Priority order: preset strings (if enabled), else a
//! 50% chance of a fuzzing-corpus string, else a 35% chance of a
//! recently seen page string.
use fastbot_core::Operation;
use rand::Rng;

use crate::config::ConfigFlags;
use crate::rewrite::PageTextCache;

pub fn patch_operate(
    op: &mut Operation,
    flags: &ConfigFlags,
    strings: &[String],
    fuzzing_strings: &[String],
    cache: &PageTextCache,
    rng: &mut impl Rng,
) {
    if !op.editable || !op.text.is_empty() {
        return;
    }

    if flags.random_pick_from_string_list && !strings.is_empty() {
        let idx = rng.gen_range(0..strings.len());
        op.text = strings[idx].clone();
        return;
    }

    if flags.doinputtext_fuzzing && !fuzzing_strings.is_empty() && rng.gen_bool(0.5) {
        let idx = rng.gen_range(0..fuzzing_strings.len());
        op.text = fuzzing_strings[idx].clone();
        return;
    }

    if !cache.is_empty() && rng.gen_bool(0.35) {
        if let Some(text) = cache.sample(rng) {
            op.text = text.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastbot_core::ActionType;
    use rand::rngs::mock::StepRng;

    fn editable_op() -> Operation {
        Operation::new(ActionType::Click, "s".into(), 0).with_editable(true)
    }

    #[test]
    fn non_editable_operations_are_left_alone() {
        let mut op = Operation::new(ActionType::Click, "s".into(), 0);
        let flags = ConfigFlags { random_pick_from_string_list: true, doinputtext_fuzzing: true, listen_mode: false };
        let cache = PageTextCache::new();
        let mut rng = StepRng::new(0, 1);
        patch_operate(&mut op, &flags, &["preset".into()], &[], &cache, &mut rng);
        assert!(op.text.is_empty());
    }

    #[test]
    fn preset_strings_take_priority_when_enabled() {
        let mut op = editable_op();
        let flags = ConfigFlags { random_pick_from_string_list: true, doinputtext_fuzzing: true, listen_mode: false };
        let cache = PageTextCache::new();
        let mut rng = StepRng::new(0, 1);
        patch_operate(&mut op, &flags, &["preset".into()], &["fuzz".into()], &cache, &mut rng);
        assert_eq!(op.text, "preset");
    }

    #[test]
    fn already_filled_text_is_never_overwritten() {
        let mut op = editable_op();
        op.text = "existing".into();
        let flags = ConfigFlags { random_pick_from_string_list: true, doinputtext_fuzzing: true, listen_mode: false };
        let cache = PageTextCache::new();
        let mut rng = StepRng::new(0, 1);
        patch_operate(&mut op, &flags, &["preset".into()], &[], &cache, &mut rng);
        assert_eq!(op.text, "existing");
    }
}
