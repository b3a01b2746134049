#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use vc_pickle as pickle;
pub use vc_pickle_format as format;
