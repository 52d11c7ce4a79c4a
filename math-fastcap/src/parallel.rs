//! Portable parallel iteration
//!
//! With the `native` feature the helpers run on rayon's thread pool,
//! otherwise they fall back to sequential iteration. Results are always
//! returned in index order so that the operator stays deterministic.

/// Check if parallel processing is available
#[inline]
pub fn is_parallel_available() -> bool {
    cfg!(feature = "native")
}

/// Parallel map over a slice
#[cfg(feature = "native")]
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    use rayon::prelude::*;
    data.par_iter().map(f).collect()
}

#[cfg(not(feature = "native"))]
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    F: Fn(&T) -> U,
{
    data.iter().map(f).collect()
}

/// Parallel map over a range of indices
#[cfg(feature = "native")]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "native"))]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}

/// Run `f(chunk_index, chunk)` over consecutive `chunk_size` chunks of `data`
///
/// Each chunk is written by exactly one call.
#[cfg(feature = "native")]
pub fn parallel_chunks_mut<T, F>(data: &mut [T], chunk_size: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    use rayon::prelude::*;
    if chunk_size == 0 {
        return;
    }
    data.par_chunks_mut(chunk_size)
        .enumerate()
        .for_each(|(i, chunk)| f(i, chunk));
}

#[cfg(not(feature = "native"))]
pub fn parallel_chunks_mut<T, F>(data: &mut [T], chunk_size: usize, f: F)
where
    F: Fn(usize, &mut [T]),
{
    if chunk_size == 0 {
        return;
    }
    data.chunks_mut(chunk_size)
        .enumerate()
        .for_each(|(i, chunk)| f(i, chunk));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_map() {
        let data: Vec<i32> = (0..100).collect();
        let result = parallel_map(&data, |x| x * 2);
        let expected: Vec<i32> = (0..100).map(|x| x * 2).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_parallel_map_indexed() {
        let result = parallel_map_indexed(100, |i| i * 2);
        let expected: Vec<usize> = (0..100).map(|i| i * 2).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_parallel_chunks_mut() {
        let mut data = vec![0usize; 12];
        parallel_chunks_mut(&mut data, 4, |i, chunk| {
            for v in chunk.iter_mut() {
                *v = i;
            }
        });
        assert_eq!(data, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
        parallel_chunks_mut(&mut data, 0, |_, _| unreachable!());
    }

    #[test]
    fn test_is_parallel_available() {
        assert_eq!(is_parallel_available(), cfg!(feature = "native"));
    }
}
