pub mod compare;

pub use compare::{compare, ComparedFolder, Comparison, RouteClass, RouteComparison};
