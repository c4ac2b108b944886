pub mod nem12_files;

pub use nem12_files::Nem12FileSource;
