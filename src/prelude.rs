//! Commonly used items for convenient importing.
//!
//! ```
//! use faultline::prelude::*;
//!
//! fn divide(a: i32, b: i32) -> Result<i32, Error> {
//!     if b == 0 {
//!         bail!("cannot divide {} by zero", a);
//!     }
//!     Ok(a / b)
//! }
//!
//! let error = divide(1, 0).with_context([("operation", "divide")]).unwrap_err();
//! assert_eq!(error.to_string(), "cannot divide 1 by zero");
//! ```

pub use crate::{Error, Handler, HandlerExt, ResultExt, bail, context, fault};
