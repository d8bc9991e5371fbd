//! Size-class math: decomposing a requested byte count into at most `k`
//! power-of-two orders that cover it with minimal excess.
//!
//! Ported from `original_source/buddy-experiment.c`'s
//! `value_size_to_block_sizes`, generalized from the hardcoded
//! `CHUNKS_COUNT`/`MIN_ORDER` of the C original (which hardcodes a
//! different `CHUNKS_COUNT` per variant: 4, 5 and 7 across
//! `buddy-experiment.c`, `chunky-mini.c` and `chunky-generic.c`) into a
//! single runtime-configurable `k`, bounded by one compiled-in
//! [`MAX_CHUNKS`], so both the buddy-backed and mini/dl/je-backed chunky
//! splitters share one implementation (see §4.1/§4.4 of `SPEC_FULL.md`).

/// Upper bound on the number of sub-allocations any chunky splitter
/// configuration may request; `k` is validated against this at
/// construction time.
pub const MAX_CHUNKS: usize = 8;

/// Returns the byte size of a block of the given order.
pub fn order_size(order: u32) -> u64 {
    1u64 << order
}

/// Decompose `size` into at most `k` (`k <= MAX_CHUNKS`) nonincreasing
/// orders in `[min_order, max_order]` whose power-of-two sum covers
/// `size + blob_header_size` (plus, once more than one chunk is needed, an
/// extra `per_chunk_overhead` allowance for each of the `k - 1` additional
/// sub-allocations) with minimal excess. Returns a fixed-size array; only
/// the first `k` entries are ever populated, the rest (and any unused
/// leading slots) are `-1`.
///
/// Mirrors the C original's algorithm: fast-path single-block sizes below
/// `2 * 2^min_order`, otherwise greedily OR in the highest set bit of the
/// remaining gap order-by-order, and if `k` orders still fall short, round
/// up by growing the covered total's lowest set bit (which is guaranteed
/// non-zero by the time this step runs, since the fast path above already
/// handled the `covered == 0` case).
pub fn decompose(
    size: usize,
    min_order: u32,
    max_order: u32,
    blob_header_size: usize,
    per_chunk_overhead: usize,
    k: usize,
) -> [i32; MAX_CHUNKS] {
    assert!((1..=MAX_CHUNKS).contains(&k), "k out of range: {k}");
    assert!(min_order <= max_order, "min_order must not exceed max_order");

    let min_block = 1u64 << min_order;
    let need = size as u64 + blob_header_size as u64;

    if need <= 2 * min_block {
        let order = if need <= min_block { min_order } else { min_order + 1 };
        let mut orders = [-1i32; MAX_CHUNKS];
        orders[0] = order as i32;
        return orders;
    }

    // From here on we may need more than one chunk, so account for the
    // per-chunk metadata overhead of the k-1 chunks beyond the first (the
    // "conservative allowance for splitting into K sub-blocks" of
    // SPEC_FULL.md §4.1).
    let need = need + (k as u64 - 1) * per_chunk_overhead as u64;

    let mut covered: u64 = 0;
    for _ in 0..k {
        if covered >= need {
            break;
        }
        // `need > covered` here, so `delta` is non-zero and `leading_zeros`
        // is well-defined (the pitfall SPEC_FULL.md's Design Notes warn
        // about: never call this on a zero delta).
        let delta = need - covered;
        let order = 63 - delta.leading_zeros();
        if order < min_order {
            covered += min_block;
            break;
        }
        covered |= 1u64 << order;
    }

    if covered < need {
        // Round up by growing the lowest set bit of `covered`, which
        // strictly increases it and is guaranteed to close the gap because
        // `need < 2 * covered` once `need` exceeds `2 * min_block`.
        let lsb = covered & covered.wrapping_neg();
        covered += lsb;
    }

    decompose_bits(covered, max_order, k)
}

/// Split a power-of-two sum into its set bits, largest to smallest,
/// -1-terminated, writing at most `k` entries.
fn decompose_bits(mut covered: u64, max_order: u32, k: usize) -> [i32; MAX_CHUNKS] {
    let mut orders = [-1i32; MAX_CHUNKS];
    let mut i = 0;
    while covered != 0 && i < k {
        let order = 63 - covered.leading_zeros();
        debug_assert!(order <= max_order, "size class exceeded max_order");
        orders[i] = order as i32;
        covered &= !(1u64 << order);
        i += 1;
    }
    debug_assert_eq!(covered, 0, "more than k set bits in the covered total");
    orders
}

/// Sum of `2^order` over the non-sentinel entries of `orders`.
pub fn covered_sum(orders: &[i32]) -> u64 {
    orders
        .iter()
        .filter(|&&o| o >= 0)
        .map(|&o| order_size(o as u32))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u32 = 5;
    // Large enough that a single k=4 decomposition can still cover the
    // driver's largest configurable size_range (20 MiB); the spec's own
    // MIN=5/MAX=20 buddy scenario is exercised separately in `buddy.rs`'s
    // tests against the much smaller sizes that scenario actually uses.
    const MAX: u32 = 25;

    fn check_coverage_and_tightness(
        size: usize,
        header: usize,
        per_chunk: usize,
        k: u64,
        orders: &[i32],
    ) {
        let sum = covered_sum(orders);
        let base_need = (size + header) as u64;
        let need = if base_need <= 2 * (1u64 << MIN) {
            base_need
        } else {
            base_need + (k - 1) * per_chunk as u64
        };
        assert!(sum >= need, "orders {:?} don't cover size {}", orders, size);
        if need >= 2 * (1u64 << MIN) {
            assert!(
                sum < 2 * need,
                "orders {:?} too loose for size {}",
                orders,
                size
            );
        }
        // Nonincreasing, -1-terminated.
        let mut seen_sentinel = false;
        let mut prev = i32::MAX;
        for &o in orders {
            if o < 0 {
                seen_sentinel = true;
                continue;
            }
            assert!(!seen_sentinel, "non-sentinel order after a sentinel");
            assert!(o <= prev, "orders not nonincreasing");
            prev = o;
        }
    }

    #[test]
    fn small_size_fits_single_block() {
        let orders = decompose(10, MIN, MAX, 8, 16, 4);
        assert_eq!(&orders[1..4], &[-1, -1, -1]);
        check_coverage_and_tightness(10, 8, 16, 4, &orders);
    }

    #[test]
    fn decompose_130_with_blob_and_block_overhead_yields_single_order_8() {
        // The spec's own concrete scenario: decompose(130) with K=4,
        // MIN_ORDER=5 should land on a single 256-byte block (order 8),
        // since 256 covers 130 plus the header/per-chunk overhead with
        // less excess than any combination of smaller orders once the
        // K-1 per-chunk padding is accounted for. Header sizes below
        // mirror a `{size, other_chunks[3]}` blob header plus one
        // two-pointer block header (48 bytes combined), with a further
        // 16-byte block-header allowance per additional chunk.
        let orders = decompose(130, MIN, MAX, 48, 16, 4);
        assert_eq!(orders, [8, -1, -1, -1]);
    }

    #[test]
    fn mid_size_uses_multiple_orders() {
        let orders = decompose(130, MIN, MAX, 16, 16, 4);
        check_coverage_and_tightness(130, 16, 16, 4, &orders);
        assert!(orders[0] >= MIN as i32);
    }

    #[test]
    fn never_exceeds_k_orders() {
        for size in [1usize, 64, 1000, 100_000, 5_000_000, 20_000_000] {
            let orders = decompose(size, MIN, MAX, 24, 16, 4);
            check_coverage_and_tightness(size, 24, 16, 4, &orders);
            assert!(orders[4..].iter().all(|&o| o == -1));
        }
    }

    #[test]
    fn larger_k_still_satisfies_coverage_and_tightness() {
        // A bigger k buys more sub-allocation slots but also more per-chunk
        // padding (k-1 chunk headers), so it isn't guaranteed to shrink the
        // total; it must still satisfy the same coverage/tightness bounds.
        let size = 3_000_000;
        let big_k = decompose(size, MIN, MAX, 24, 16, 7);
        check_coverage_and_tightness(size, 24, 16, 7, &big_k);
    }

    #[test]
    #[should_panic]
    fn rejects_k_above_max_chunks() {
        decompose(100, MIN, MAX, 8, 8, MAX_CHUNKS + 1);
    }
}
