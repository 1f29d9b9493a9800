pub mod profile;
pub mod session;

pub use profile::{profile_get, profile_put};
pub use session::{csrf_token, signout, whoami};
