pub mod primary;
pub mod repomd;

pub use primary::Primary;
pub use repomd::Index;
