//! Page-count discovery for paginated resources of unknown length.
//!
//! [`find_max_page`] brackets the last page by jumping forward (or backward)
//! from a seed page in fixed steps, then binary-searches the bracket. The
//! number of probes grows with the distance from the seed divided by the
//! step plus `log2(step)`, not with the page count itself.

use std::future::Future;

use super::Page;
use crate::error::FetchError;

/// Result of a page-count probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProbe {
    /// Highest valid page (0 when the resource is empty).
    pub max_page: u32,
    /// Probe requests issued.
    pub requests: u32,
}

struct Prober<F> {
    fetch: F,
    requests: u32,
}

impl<F, Fut, T> Prober<F>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    async fn is_valid(&mut self, page: u32) -> Result<bool, FetchError> {
        self.requests += 1;
        match (self.fetch)(page).await {
            Ok(result) => Ok(!result.is_out_of_range(page)),
            Err(FetchError::OutOfRange { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Finds the highest valid page index.
///
/// A page is invalid when the fetch reports [`FetchError::OutOfRange`], the
/// page is empty, or its reported page count is below the probed index.
/// `seed` and `step` of zero are treated as one.
///
/// # Errors
///
/// Any other [`FetchError`] aborts the probe and is returned as-is.
pub async fn find_max_page<F, Fut, T>(
    fetch: F,
    seed: u32,
    step: u32,
) -> Result<PageProbe, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    let seed = seed.max(1);
    let step = step.max(1);
    let mut prober = Prober { fetch, requests: 0 };

    // Bracket: `lo` is valid (or 0), `hi` is invalid.
    let (mut lo, mut hi) = if prober.is_valid(seed).await? {
        let mut lo = seed;
        loop {
            let next = lo.saturating_add(step);
            if next == lo || !prober.is_valid(next).await? {
                break (lo, next);
            }
            lo = next;
        }
    } else {
        let mut hi = seed;
        loop {
            if hi == 1 {
                return Ok(PageProbe {
                    max_page: 0,
                    requests: prober.requests,
                });
            }
            let next = hi.saturating_sub(step).max(1);
            if prober.is_valid(next).await? {
                break (next, hi);
            }
            hi = next;
        }
    };

    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if prober.is_valid(mid).await? {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    tracing::debug!(max_page = lo, requests = prober.requests, "page count probed");
    Ok(PageProbe {
        max_page: lo,
        requests: prober.requests,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    async fn fake_page(page: u32, max: u32) -> Result<Page<u32>, FetchError> {
        if page > max {
            Err(FetchError::OutOfRange { page })
        } else {
            Ok(Page::new(vec![page]))
        }
    }

    async fn probe(max: u32, seed: u32, step: u32) -> PageProbe {
        let Ok(result) = find_max_page(|p| fake_page(p, max), seed, step).await else {
            panic!("probe should succeed");
        };
        result
    }

    #[tokio::test]
    async fn finds_exact_count_for_every_size() {
        for max in 0..120 {
            for (seed, step) in [(1, 1), (20, 10), (35, 50), (0, 0), (119, 7)] {
                let result = probe(max, seed, step).await;
                assert_eq!(result.max_page, max, "max={max} seed={seed} step={step}");
            }
        }
    }

    #[tokio::test]
    async fn empty_resource_returns_zero() {
        let result = probe(0, 1, 10).await;
        assert_eq!(result, PageProbe { max_page: 0, requests: 1 });
    }

    #[tokio::test]
    async fn request_count_is_logarithmic_after_bracketing() {
        // Seed 350 / step 50 on a 373-page book: 2 bracketing probes + log2(50).
        let result = probe(373, 350, 50).await;
        assert_eq!(result.max_page, 373);
        assert!(result.requests <= 2 + 6, "requests = {}", result.requests);
    }

    #[tokio::test]
    async fn reported_total_below_index_is_out_of_range() {
        let fetch = |page: u32| async move {
            Ok::<_, FetchError>(Page {
                items: vec![0u8],
                total_pages: Some(if page <= 12 { 12 } else { 11 }),
            })
        };
        let Ok(result) = find_max_page(fetch, 5, 5).await else {
            panic!("probe should succeed");
        };
        assert_eq!(result.max_page, 12);
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let fetch = |page: u32| async move {
            if page > 3 {
                Err::<Page<u8>, _>(FetchError::Timeout(std::time::Duration::from_secs(1)))
            } else {
                Ok(Page::new(vec![1]))
            }
        };
        let result = find_max_page(fetch, 1, 5).await;
        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }
}
