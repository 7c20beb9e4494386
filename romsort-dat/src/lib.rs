pub mod dat;
pub mod error;
pub mod indexed_files;

pub use dat::{Dat, Game, Parent, Release, Rom};
pub use error::DatError;
pub use indexed_files::IndexedFiles;
