//! Play-order generation: permutations of problem indices.

use rand::Rng;

/// Uniformly random permutation of `0..n` using the thread-local RNG.
pub fn shuffle(n: usize) -> Vec<usize> {
  shuffle_with(&mut rand::thread_rng(), n)
}

/// Fisher-Yates over `0..n`: for `i` from `n-1` down to `1`, swap with `j` in `[0, i]`.
pub fn shuffle_with<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<usize> {
  let mut order = identity(n);
  for i in (1..n).rev() {
    let j = rng.gen_range(0..=i);
    order.swap(i, j);
  }
  order
}

pub fn identity(n: usize) -> Vec<usize> {
  (0..n).collect()
}
