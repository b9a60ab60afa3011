pub mod codec;
pub mod derive;
