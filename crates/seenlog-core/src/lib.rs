pub mod batch;
pub mod characters;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod selection;
pub mod view;

pub use batch::*;
pub use characters::*;
pub use config::*;
pub use error::*;
pub use reconcile::*;
pub use selection::*;
pub use view::*;
