pub mod booth;
pub mod playlist;
pub mod shared;
pub mod source;
pub mod waitlist;
