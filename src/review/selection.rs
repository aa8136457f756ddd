//! Reviewer selection: uniform sampling without replacement.

use rand::Rng;
use rand::seq::SliceRandom;

/// Maximum number of reviewers assigned when a pull request is created.
pub const REVIEWERS_PER_PR: usize = 2;

/// Pick up to `count` distinct ids from `pool`, uniformly at random.
///
/// Returns fewer than `count` ids when the pool is smaller, and nothing for an
/// empty pool. The pool itself is left untouched.
pub fn select_reviewers<R>(pool: &[String], count: usize, rng: &mut R) -> Vec<String>
where
    R: Rng + ?Sized,
{
    pool.choose_multiple(rng, count).cloned().collect()
}

/// Remove every id in `excluded` from `pool`, keeping the original order.
pub fn exclude<'a, I>(pool: Vec<String>, excluded: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    pool.into_iter()
        .filter(|id| !excluded.clone().into_iter().any(|ex| ex == id.as_str()))
        .collect()
}
