#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so `use crate::db::models::*;`
//! reaches every entity.

pub mod device_token;
pub mod notification;
pub mod preference;
pub mod template;

pub use self::device_token::*;
pub use self::notification::*;
pub use self::preference::*;
pub use self::template::*;
