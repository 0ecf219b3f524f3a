//! Deferred ("placeholder") buffer bindings.
//!
//! A functor captures a `Placeholder<T>` when it is defined, but the buffer
//! behind it is only declared to the queue when the functor's kernel is
//! submitted. The submission must re-supply every captured placeholder as a
//! `Binding`; the handler checks the two lists against each other before
//! anything reaches the worker.
//!
//! At launch the bound buffers are staged into a `Captures` table. A kernel
//! body reads from it through a `Capture<T>` token, and tokens are only
//! handed out by declaring the placeholder, so every read has a matching
//! declaration and therefore a validated binding.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use serde::Deserialize;

use crate::buffer::{Buffer, BufferHandle, BufferId, Element};
use crate::error::{DeviceError, Result};

static NEXT_PLACEHOLDER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a placeholder; shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderId(pub u64);

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// How placeholders captured by a functor are resolved at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderMode {
    /// The submission re-supplies each captured placeholder as a binding.
    #[default]
    Explicit,
    /// The runtime would rediscover captures on its own. Not supported:
    /// submissions that capture placeholders are refused.
    Implicit,
}

/// Symbolic reference a functor records for each placeholder it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderRef {
    pub id: PlaceholderId,
    pub buffer: BufferId,
}

/// Deferred read scope over a specific buffer.
pub struct Placeholder<T> {
    id: PlaceholderId,
    buffer: Buffer<T>,
}

impl<T> Clone for Placeholder<T> {
    fn clone(&self) -> Self {
        Placeholder {
            id: self.id,
            buffer: self.buffer.clone(),
        }
    }
}

impl<T> fmt::Debug for Placeholder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Placeholder")
            .field("id", &self.id)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<T: Element> Placeholder<T> {
    pub fn new(buffer: &Buffer<T>) -> Self {
        Placeholder {
            id: PlaceholderId(NEXT_PLACEHOLDER_ID.fetch_add(1, Ordering::Relaxed)),
            buffer: buffer.clone(),
        }
    }

    pub fn id(&self) -> PlaceholderId {
        self.id
    }

    pub fn buffer_id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn reference(&self) -> PlaceholderRef {
        PlaceholderRef {
            id: self.id,
            buffer: self.buffer.id(),
        }
    }

    /// Re-supply this placeholder against the buffer it was created over.
    pub fn bind(&self) -> Binding {
        self.bind_to(&self.buffer)
    }

    /// Map this placeholder to `buffer` for one submission.
    pub fn bind_to(&self, buffer: &Buffer<T>) -> Binding {
        Binding {
            id: self.id,
            handle: buffer.handle(),
        }
    }
}

/// Read token for a declared placeholder.
pub struct Capture<T> {
    reference: PlaceholderRef,
    _element: PhantomData<fn() -> T>,
}

impl<T> Clone for Capture<T> {
    fn clone(&self) -> Self {
        Capture {
            reference: self.reference,
            _element: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Capture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capture").field(&self.reference.id).finish()
    }
}

impl<T> Capture<T> {
    pub fn reference(&self) -> PlaceholderRef {
        self.reference
    }
}

/// Placeholders declared by one functor.
#[derive(Debug, Clone, Default)]
pub struct CaptureSet {
    references: Vec<PlaceholderRef>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `placeholder` and return the token its reads go through.
    pub fn capture<T: Element>(&mut self, placeholder: &Placeholder<T>) -> Capture<T> {
        let reference = placeholder.reference();
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
        Capture {
            reference,
            _element: PhantomData,
        }
    }

    pub fn extend(&mut self, references: &[PlaceholderRef]) {
        for reference in references {
            if !self.references.contains(reference) {
                self.references.push(*reference);
            }
        }
    }

    pub fn references(&self) -> &[PlaceholderRef] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Placeholder → buffer mapping supplied at submission time.
#[derive(Clone)]
pub struct Binding {
    id: PlaceholderId,
    handle: Arc<dyn BufferHandle>,
}

impl Binding {
    pub fn placeholder(&self) -> PlaceholderId {
        self.id
    }

    pub fn buffer_id(&self) -> BufferId {
        self.handle.id()
    }

    pub(crate) fn handle(&self) -> &Arc<dyn BufferHandle> {
        &self.handle
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("placeholder", &self.id)
            .field("buffer", &self.handle.id())
            .finish()
    }
}

/// Placeholder contents staged for one kernel launch.
#[derive(Default)]
pub struct Captures {
    staged: FxHashMap<PlaceholderId, Box<dyn Any + Send + Sync>>,
}

impl Captures {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn stage(bindings: &[Binding]) -> Self {
        let mut captures = Self::default();
        for binding in bindings {
            captures
                .staged
                .insert(binding.id, binding.handle.snapshot());
        }
        captures
    }

    /// Staged contents of a declared placeholder.
    ///
    /// A declared placeholder always has a validated binding over a
    /// `Buffer<T>`, so the lookup only misses when a token is carried into
    /// a different functor than the one that declared it. The worker
    /// reports that panic as a kernel fault.
    pub fn read<T: 'static>(&self, capture: &Capture<T>) -> &[T] {
        match self.get::<T>(capture.reference.id) {
            Some(values) => values,
            None => panic!(
                "placeholder {} is not declared by this kernel",
                capture.reference.id
            ),
        }
    }

    pub fn get<T: 'static>(&self, id: PlaceholderId) -> Option<&[T]> {
        self.staged
            .get(&id)
            .and_then(|staged| staged.downcast_ref::<Vec<T>>())
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

/// Check the functor's declared placeholders against the supplied bindings.
pub(crate) fn validate(
    kernel: &str,
    mode: PlaceholderMode,
    declared: &[PlaceholderRef],
    bindings: &[Binding],
) -> Result<()> {
    if mode == PlaceholderMode::Implicit {
        if let Some(first) = declared.first() {
            return Err(DeviceError::ImplicitPlaceholder {
                kernel: kernel.to_string(),
                placeholder: first.id,
            });
        }
        return Ok(());
    }

    for reference in declared {
        let binding = bindings
            .iter()
            .find(|b| b.id == reference.id)
            .ok_or_else(|| DeviceError::MissingBinding {
                kernel: kernel.to_string(),
                placeholder: reference.id,
            })?;
        if binding.buffer_id() != reference.buffer {
            return Err(DeviceError::BindingMismatch {
                kernel: kernel.to_string(),
                placeholder: reference.id,
                expected: reference.buffer,
                found: binding.buffer_id(),
            });
        }
    }
    Ok(())
}
