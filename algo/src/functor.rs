//! Kernel functors: per-element maps and binary combiners.

use std::fmt;
use std::ops::Add;
use std::sync::Arc;

use parfold_device::{CaptureSet, Captures, Element, PlaceholderRef};

/// Named elementwise map `A -> B`.
///
/// A body that reads placeholders is built by [`ElementFn::with_captures`].
/// The builder declares each placeholder and hands back the `Capture` token
/// the body reads through, so a body cannot read a placeholder its functor
/// did not declare. The submission then has to bind every declared one.
pub struct ElementFn<A, B> {
    name: String,
    body: Arc<dyn Fn(&A, &Captures) -> B + Send + Sync>,
    captures: Vec<PlaceholderRef>,
}

impl<A, B> Clone for ElementFn<A, B> {
    fn clone(&self) -> Self {
        ElementFn {
            name: self.name.clone(),
            body: self.body.clone(),
            captures: self.captures.clone(),
        }
    }
}

impl<A, B> fmt::Debug for ElementFn<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementFn")
            .field("name", &self.name)
            .field("captures", &self.captures)
            .finish()
    }
}

impl<A: Element, B: Element> ElementFn<A, B> {
    /// Map without captures.
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        ElementFn {
            name: name.to_string(),
            body: Arc::new(move |x: &A, _: &Captures| body(x)),
            captures: Vec::new(),
        }
    }

    /// Map whose body reads placeholders.
    ///
    /// `build` declares them on the `CaptureSet` and returns the body.
    ///
    /// ```rust,ignore
    /// let normalize = ElementFn::with_captures("normalize", |cx| {
    ///     let max = cx.capture(&m);
    ///     move |x: &f32, c: &Captures| x / c.read(&max)[0]
    /// });
    /// ```
    pub fn with_captures<F, G>(name: &str, build: G) -> Self
    where
        G: FnOnce(&mut CaptureSet) -> F,
        F: Fn(&A, &Captures) -> B + Send + Sync + 'static,
    {
        let mut declared = CaptureSet::new();
        let body = build(&mut declared);
        ElementFn {
            name: name.to_string(),
            body: Arc::new(body),
            captures: declared.references().to_vec(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn captures(&self) -> &[PlaceholderRef] {
        &self.captures
    }

    pub fn call(&self, x: &A, captures: &Captures) -> B {
        (self.body)(x, captures)
    }
}

/// Named binary fold operation.
///
/// The tree fold regroups operands freely, so the operation must be
/// associative and commutative.
pub struct Combiner<T> {
    name: String,
    op: Arc<dyn Fn(T, T) -> T + Send + Sync>,
}

impl<T> Clone for Combiner<T> {
    fn clone(&self) -> Self {
        Combiner {
            name: self.name.clone(),
            op: self.op.clone(),
        }
    }
}

impl<T> fmt::Debug for Combiner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combiner").field("name", &self.name).finish()
    }
}

impl<T: Element> Combiner<T> {
    pub fn new<F>(name: &str, op: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Combiner {
            name: name.to_string(),
            op: Arc::new(op),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, left: T, right: T) -> T {
        (self.op)(left, right)
    }
}

impl<T: Element + PartialOrd> Combiner<T> {
    /// Larger operand; ties keep the left one.
    pub fn max() -> Self {
        Combiner::new("max", |a: T, b: T| if b > a { b } else { a })
    }

    /// Smaller operand; ties keep the left one.
    pub fn min() -> Self {
        Combiner::new("min", |a: T, b: T| if b < a { b } else { a })
    }
}

impl<T: Element + Add<Output = T>> Combiner<T> {
    pub fn sum() -> Self {
        Combiner::new("sum", |a: T, b: T| a + b)
    }
}
