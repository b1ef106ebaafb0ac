pub mod apply;
pub mod plan;
pub mod state;
pub mod validate;
pub mod version;
