//! parfold algorithms
//!
//! Generic data-parallel primitives over a [`parfold_device::Queue`]:
//!
//! - [`transform`]: elementwise map in a single flat launch
//! - [`reduce`]: multi-pass tree fold to one scalar
//!
//! A reduction result can feed a later transform without waiting on the
//! host: wrap the one-element output in a [`Placeholder`], capture it in the
//! transform's functor and bind it at submission.
//!
//! ```rust,ignore
//! let max = Buffer::new(1);
//! reduce_max(&queue, &input, &max)?;
//!
//! let m = Placeholder::new(&max);
//! let normalize = ElementFn::with_captures("normalize", |cx| {
//!     let max = cx.capture(&m);
//!     move |x: &f32, c: &Captures| x / c.read(&max)[0]
//! });
//! transform(&queue, &input, &output, &normalize, &[m.bind()])?;
//! ```

pub mod error;
pub mod functor;
pub mod logging;
pub mod reduce;
pub mod transform;

pub use error::{AlgoError, Result};
pub use functor::{Combiner, ElementFn};
pub use reduce::{fold_strides, reduce, reduce_max, reduce_min, reduce_sum, FoldPlan, PassPlan, TreeFold};
pub use transform::transform;

pub use parfold_device::{
    Binding, Buffer, Capture, CaptureSet, Captures, Placeholder, Queue, QueueConfig,
};
