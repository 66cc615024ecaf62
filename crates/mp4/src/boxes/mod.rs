//! Box schemas, each parsed through a [`BoxReader`](crate::box_reader::BoxReader).

mod fragment;
mod movie;
mod protection;
mod sample_entry;
mod sample_group;

pub use fragment::*;
pub use movie::*;
pub use protection::*;
pub use sample_entry::*;
pub use sample_group::{
    CencSampleEncryptionInfoEntry, FRAGMENT_GROUP_DESCRIPTION_INDEX_BASE, SampleGroupDescription,
    SampleToGroup, SampleToGroupEntry,
};
