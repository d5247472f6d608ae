//! Device-independent UI exploration primitives: parsing a screen dump
//! into a tree, projecting it into actionable widgets, building a
//! deduplicated state-action graph, and emitting the one value that
//! crosses the boundary to a driver (`Operation`).

pub mod action;
pub mod binary;
pub mod element;
pub mod error;
pub mod filter;
pub mod graph;
pub mod hash;
pub mod operation;
pub mod rect;
pub mod state;
pub mod widget;
pub mod xml;

pub use action::{Action, ActionType};
pub use element::{ElementNode, ElementTree, NodeId, ScrollType, Xpath};
pub use error::{EmptyTreeError, ParseError};
pub use filter::ActionFilter;
pub use graph::{ActivityDistribution, Graph, GraphListener};
pub use operation::Operation;
pub use rect::{Point, Rect};
pub use state::State;
pub use widget::{OperateType, Widget, WidgetKeyMask};
