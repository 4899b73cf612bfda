pub mod model;
pub mod util;
pub mod validate;
