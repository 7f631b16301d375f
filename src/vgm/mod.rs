//! VGM file format: header, command table, stream decoder and GD3 tag

pub mod builder;
pub mod commands;
pub mod decoder;
pub mod gd3;
pub mod header;
pub mod load;
pub mod reader;

pub use builder::VgmBuilder;
pub use commands::OplPort;
pub use decoder::{Decoded, OplWrite, StreamDecoder};
pub use gd3::Gd3Tag;
pub use header::{ChipClock, VgmHeader};
pub use load::VgmFile;
pub use reader::VgmReader;
