//! Shard allocator (C2): a pure function from the current occupancy
//! snapshot to the next free shard, or `ShardsExhausted`.

use std::collections::HashSet;

use ingest_core::AppError;

/// Formats the shard identifier for index `i` (`shard-0`, `shard-1`, ...).
pub fn shard_name(i: u32) -> String {
	format!("shard-{i}")
}

/// Given `shard_count` and the set of shards currently occupied by some
/// team's active token, returns the lowest-indexed free shard.
///
/// Deterministic: the same occupancy snapshot always yields the same
/// answer, which is what lets [`crate::registry::TokenRegistry::create`]
/// reason about I3 (one tenant per shard) without needing to retry.
pub fn allocate(shard_count: u32, occupied: &HashSet<String>) -> Result<String, AppError> {
	(0..shard_count)
		.map(shard_name)
		.find(|s| !occupied.contains(s))
		.ok_or(AppError::ShardsExhausted)
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	proptest! {
		/// P5-adjacent: for any occupancy snapshot, allocation is a pure
		/// function of its inputs — calling it twice never disagrees with
		/// itself, regardless of `HashSet` iteration order.
		#[test]
		fn allocation_is_always_deterministic(shard_count in 1u32..16, occupied_indices in prop::collection::hash_set(0u32..16, 0..16)) {
			let occupied: HashSet<String> = occupied_indices.iter().copied().map(shard_name).collect();
			prop_assert_eq!(allocate(shard_count, &occupied).ok(), allocate(shard_count, &occupied).ok());
		}

		/// P2 (one-tenant-per-shard): whenever allocation succeeds, the
		/// returned shard was not in the occupancy snapshot — the allocator
		/// can never hand out a shard it was just told is taken.
		#[test]
		fn allocated_shard_is_never_already_occupied(shard_count in 1u32..16, occupied_indices in prop::collection::hash_set(0u32..16, 0..16)) {
			let occupied: HashSet<String> = occupied_indices.iter().copied().map(shard_name).collect();
			if let Ok(shard) = allocate(shard_count, &occupied) {
				prop_assert!(!occupied.contains(&shard));
			}
		}

		/// Exhaustion is exact: allocation fails if and only if every index
		/// in `0..shard_count` is occupied.
		#[test]
		fn exhaustion_iff_fully_occupied(shard_count in 1u32..8, occupied_indices in prop::collection::hash_set(0u32..8, 0..8)) {
			let occupied: HashSet<String> = occupied_indices.iter().copied().map(shard_name).collect();
			let all_occupied = (0..shard_count).all(|i| occupied.contains(&shard_name(i)));
			prop_assert_eq!(allocate(shard_count, &occupied).is_err(), all_occupied);
		}
	}

	#[test]
	fn picks_lowest_free_index() {
		let occupied: HashSet<String> = ["shard-0".to_string()].into_iter().collect();
		assert_eq!(allocate(3, &occupied).unwrap(), "shard-1");
	}

	#[test]
	fn empty_occupancy_picks_shard_zero() {
		assert_eq!(allocate(4, &HashSet::new()).unwrap(), "shard-0");
	}

	#[test]
	fn exhaustion_is_an_error() {
		let occupied: HashSet<String> = (0..3).map(shard_name).collect();
		assert!(matches!(
			allocate(3, &occupied),
			Err(AppError::ShardsExhausted)
		));
	}

	#[test]
	fn allocation_is_deterministic() {
		let occupied: HashSet<String> = ["shard-1".to_string()].into_iter().collect();
		assert_eq!(
			allocate(5, &occupied).unwrap(),
			allocate(5, &occupied).unwrap()
		);
	}
}
