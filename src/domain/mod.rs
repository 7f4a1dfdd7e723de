mod clock;
mod integrity;
mod invoice;
mod membership;
mod user;

pub use clock::*;
pub use integrity::*;
pub use invoice::*;
pub use membership::*;
pub use user::*;
