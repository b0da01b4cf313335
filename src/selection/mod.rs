// src/selection/mod.rs

pub mod heuristic;
pub mod mastery;
pub mod selector;

pub use heuristic::{Candidate, LeastMasteredFirst, SelectionHeuristic, WeightedRandom};
pub use mastery::MasteryState;
pub use selector::{ProblemSelector, Selection};
