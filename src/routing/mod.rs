pub mod router;

pub use router::{Route, Router};
