mod default_map;

pub use default_map::{DefaultMap, DefaultTwoKeyMap, TwoKeyMap};
