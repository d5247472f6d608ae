//! Process-wide rewrite rules, loaded once and passed into `Model` by
//! value rather than reached for through a global — see the "Global
//! mutable state" design note this crate grounds.

use std::collections::HashSet;

use fastbot_core::element::ElementTree;
use fastbot_core::Operation;
use rand::Rng;

use crate::config::{
    self, BlackWidgetEntry, ConfigFlags, ConfigSource, CustomEvent, MappingTable, TreePruningRule,
};
use crate::custom_events::{CustomEventState, QueuedAction};
use crate::patch;
use crate::rewrite::{self, BlackRect, PageTextCache};

pub struct Preference {
    mapping: MappingTable,
    flags: ConfigFlags,
    strings: Vec<String>,
    fuzzing_strings: Vec<String>,
    valid_texts: HashSet<String>,
    pruning: Vec<TreePruningRule>,
    black_widgets: Vec<BlackWidgetEntry>,
    black_rects: Vec<BlackRect>,
    page_text_cache: PageTextCache,
    custom_events: CustomEventState,
}

impl Preference {
    /// Load every config file from `source`, logging and skipping any
    /// that fails to parse; the remaining files still load.
    pub fn load(source: &dyn ConfigSource) -> Self {
        let mapping = load_or_default("max.mapping", config::load_mapping(source));
        let flags = load_or_default("max.config", config::load_config(source));
        let strings = load_or_default("max.strings", config::load_strings(source, "max.strings"));
        let fuzzing_strings = load_or_default("max.fuzzing.strings", config::load_fuzzing_strings(source));
        let valid_texts: HashSet<String> = load_or_default(
            "max.valid.strings",
            config::load_strings(source, "max.valid.strings"),
        )
        .into_iter()
        .collect();
        let pruning = load_or_default("max.tree.pruning", config::load_tree_pruning(source));
        let black_widgets = load_or_default("max.widget.black", config::load_widget_black(source));
        let events: Vec<CustomEvent> = load_or_default("max.xpath.actions", config::load_xpath_actions(source));

        Preference {
            mapping,
            flags,
            strings,
            fuzzing_strings,
            valid_texts,
            pruning,
            black_widgets,
            black_rects: Vec::new(),
            page_text_cache: PageTextCache::new(),
            custom_events: CustomEventState::new(events),
        }
    }

    pub fn empty() -> Self {
        Preference {
            mapping: MappingTable::default(),
            flags: ConfigFlags::default(),
            strings: Vec::new(),
            fuzzing_strings: Vec::new(),
            valid_texts: HashSet::new(),
            pruning: Vec::new(),
            black_widgets: Vec::new(),
            black_rects: Vec::new(),
            page_text_cache: PageTextCache::new(),
            custom_events: CustomEventState::new(Vec::new()),
        }
    }

    /// Black-widget deletion, then the resource-id/pruning/valid-text
    /// normalization walk. Runs once per step, before `State` is built.
    pub fn rewrite(&mut self, tree: &mut ElementTree, activity: &str) {
        let removed = rewrite::apply_black_widgets(tree, activity, &self.black_widgets);
        self.black_rects.extend(removed);
        rewrite::normalize_pass(
            tree,
            activity,
            &self.mapping,
            &self.pruning,
            &self.valid_texts,
            &mut self.page_text_cache,
        );
    }

    pub fn try_custom_action(&mut self, activity: &str, tree: &ElementTree, rng: &mut impl Rng) -> Option<QueuedAction> {
        self.custom_events.maybe_fire(activity, tree, rng);
        self.custom_events.pop()
    }

    pub fn patch_operate(&self, op: &mut Operation, rng: &mut impl Rng) {
        patch::patch_operate(op, &self.flags, &self.strings, &self.fuzzing_strings, &self.page_text_cache, rng);
    }

    pub fn is_point_in_black_rects(&self, activity: &str, x: i32, y: i32) -> bool {
        rewrite::is_point_in_black_rects(&self.black_rects, activity, x, y)
    }

    pub fn flags(&self) -> ConfigFlags {
        self.flags
    }
}

fn load_or_default<T: Default>(key: &str, result: Result<T, crate::error::ConfigError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(config = key, error = %err, "skipping unloadable config file");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfigSource;

    #[test]
    fn missing_config_files_fall_back_to_defaults_without_panicking() {
        let source = MapConfigSource::new();
        let pref = Preference::load(&source);
        assert!(pref.flags().random_pick_from_string_list);
        assert!(!pref.is_point_in_black_rects("A", 0, 0));
    }

    #[test]
    fn loaded_mapping_is_applied_during_rewrite() {
        let source = MapConfigSource::new().with("max.mapping", "obf -> :id/real\n");
        let mut pref = Preference::load(&source);
        let mut tree = ElementTree::new();
        let root = tree.push(None);
        tree.get_mut(root).resource_id = "obf".into();
        pref.rewrite(&mut tree, "com.example/.Main");
        assert_eq!(tree.get(root).resource_id, ":id/real");
    }
}
