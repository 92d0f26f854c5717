//! Chunk planning
//!
//! Splits the ordered offset list into contiguous chunks. Pure and
//! deterministic: the same offsets and worker count always give the same plan.

/// Upper bound on records per chunk; keeps each worker's local result set small
pub const MAX_CHUNK_RECORDS: usize = 10_000;

/// A contiguous run of records handed to exactly one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: usize,
    pub start_offset: u64,
    pub record_count: usize,
}

/// Records per chunk for `total` records spread over `workers`
pub fn chunk_size_for(total: usize, workers: usize) -> usize {
    let workers = workers.max(1);
    total.div_ceil(workers).clamp(1, MAX_CHUNK_RECORDS)
}

/// Partition `offsets` into chunks of at most [`chunk_size_for`] records
pub fn plan_chunks(offsets: &[u64], workers: usize) -> Vec<Chunk> {
    let size = chunk_size_for(offsets.len(), workers);
    offsets
        .chunks(size)
        .enumerate()
        .map(|(id, group)| Chunk {
            id,
            start_offset: group[0],
            record_count: group.len(),
        })
        .collect()
}
