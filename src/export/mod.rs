//! Export of completed runs.
//!
//! - Notebook: converts the exported Markdown into a notebook bundle
//! - Download: delivers generated files to the user

pub mod download;
pub mod notebook;

pub use download::{DirectoryDownloadSink, Download, DownloadSink, MemoryDownloadSink};
pub use notebook::{
    markdown_to_notebook, notebook_file_name, split_sections, Cell, Notebook, NOTEBOOK_MIME_TYPE,
};
