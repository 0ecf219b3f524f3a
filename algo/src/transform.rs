//! Elementwise transform: `output[i] = f(input[i])` in one flat launch.

use log::debug;
use parfold_device::{Binding, Buffer, Element, Queue, Task};

use crate::error::{AlgoError, Result};
use crate::functor::ElementFn;

/// Submit `f` over every element of `input`, writing `output`.
///
/// `bindings` re-supplies every placeholder `f` captures; extra bindings only
/// order the launch after their producers. Returns without waiting.
pub fn transform<A, B>(
    queue: &Queue,
    input: &Buffer<A>,
    output: &Buffer<B>,
    f: &ElementFn<A, B>,
    bindings: &[Binding],
) -> Result<Task>
where
    A: Element,
    B: Element,
{
    if input.len() != output.len() {
        return Err(AlgoError::LengthMismatch {
            input: input.len(),
            output: output.len(),
        });
    }

    debug!(
        "transform '{}' over {} elements, {} captures",
        f.name(),
        input.len(),
        f.captures().len()
    );

    let body = f.clone();
    let task = queue.submit(f.name(), |h| {
        h.require(body.captures());
        for binding in bindings {
            h.bind(binding);
        }
        let src = h.read(input);
        let dst = h.discard_write(output);
        h.parallel_for(src, dst, move |x: &A, captures| body.call(x, captures))
    })?;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parfold_device::{DeviceError, QueueConfig};

    #[test]
    fn test_square() {
        let queue = Queue::new(QueueConfig::default()).unwrap();
        let input = Buffer::from_vec(vec![1i64, 2, 3, 4]);
        let output: Buffer<i64> = Buffer::new(4);
        let square = ElementFn::new("square", |x: &i64| x * x);
        transform(&queue, &input, &output, &square, &[])
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(output.to_vec().unwrap(), vec![1, 4, 9, 16]);
    }

    #[test]
    fn test_length_mismatch_submits_nothing() {
        let queue = Queue::new(QueueConfig::default()).unwrap();
        let input = Buffer::from_vec(vec![1i64, 2]);
        let output: Buffer<i64> = Buffer::new(3);
        let id = ElementFn::new("id", |x: &i64| *x);
        assert_eq!(
            transform(&queue, &input, &output, &id, &[]).unwrap_err(),
            AlgoError::LengthMismatch {
                input: 2,
                output: 3
            }
        );
        assert_eq!(queue.submitted(), 0);
    }

    #[test]
    fn test_in_place_is_rejected() {
        let queue = Queue::new(QueueConfig::default()).unwrap();
        let data = Buffer::from_vec(vec![1.0f32, 2.0]);
        let neg = ElementFn::new("neg", |x: &f32| -x);
        assert!(matches!(
            transform(&queue, &data, &data, &neg, &[]),
            Err(AlgoError::Device(DeviceError::ConflictingScopes { .. }))
        ));
    }

    #[test]
    fn test_empty_buffers_are_a_no_op() {
        let queue = Queue::new(QueueConfig::default()).unwrap();
        let input: Buffer<f32> = Buffer::new(0);
        let output: Buffer<f32> = Buffer::new(0);
        let id = ElementFn::new("id", |x: &f32| *x);
        let task = transform(&queue, &input, &output, &id, &[]).unwrap();
        task.wait().unwrap();
        assert!(output.to_vec().unwrap().is_empty());
    }
}
