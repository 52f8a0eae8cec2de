use crate::error::{Error, Result};
use crate::MIN_PART_SIZE;
use std::ops::Range;

/// One contiguous slice of the payload, uploaded as part `part_number`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub offset: usize,
    pub length: usize,
    pub part_number: u32,
}

impl ChunkDescriptor {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }
}

/// Splits `payload_size` bytes into parts of `chunk_size`, the last one
/// taking the remainder. An empty payload still yields a single empty part.
pub fn plan(payload_size: usize, chunk_size: usize) -> Result<Vec<ChunkDescriptor>> {
    if chunk_size == 0 {
        return Err(Error::Configuration(
            "chunk size must be greater than zero".to_owned(),
        ));
    }

    let count = if payload_size == 0 {
        1
    } else {
        (payload_size + chunk_size - 1) / chunk_size
    };

    if count > 1 && chunk_size < MIN_PART_SIZE {
        return Err(Error::Configuration(format!(
            "chunk size {} is lower than {} bytes while the upload has {} parts",
            chunk_size, MIN_PART_SIZE, count
        )));
    }
    if count > u32::MAX as usize {
        return Err(Error::Configuration(format!(
            "{} parts exceed the part number range",
            count
        )));
    }

    Ok((0..count)
        .map(|i| {
            let offset = i * chunk_size;
            ChunkDescriptor {
                offset,
                length: chunk_size.min(payload_size - offset),
                part_number: i as u32 + 1,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{plan, ChunkDescriptor};
    use crate::error::Error;
    use crate::MIN_PART_SIZE;
    use rand::Rng;

    fn check_partition(parts: &[ChunkDescriptor], payload_size: usize) {
        let mut offset = 0;
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.part_number as usize, i + 1);
            assert_eq!(part.offset, offset);
            offset += part.length;
        }
        assert_eq!(offset, payload_size);
    }

    #[test]
    fn test_plan() {
        let mut rng = rand::thread_rng();
        for _ in 0..256 {
            let chunk_size = rng.gen_range(MIN_PART_SIZE..=MIN_PART_SIZE * 3);
            let payload_size = rng.gen_range(0..=chunk_size * 8);
            let parts = plan(payload_size, chunk_size).unwrap();
            let expected = (payload_size + chunk_size - 1) / chunk_size;
            assert_eq!(parts.len(), expected.max(1));
            check_partition(&parts, payload_size);
        }
    }

    #[test]
    fn test_small_single_part() {
        // the minimum only applies once there is more than one part
        let parts = plan(1000, 4096).unwrap();
        assert_eq!(
            parts,
            vec![ChunkDescriptor {
                offset: 0,
                length: 1000,
                part_number: 1,
            }]
        );
    }

    #[test]
    fn test_empty() {
        let parts = plan(0, MIN_PART_SIZE).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].length, 0);
        assert_eq!(parts[0].range(), 0..0);
    }

    #[test]
    fn test_exact_multiple() {
        let parts = plan(MIN_PART_SIZE * 3, MIN_PART_SIZE).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|part| part.length == MIN_PART_SIZE));
        assert_eq!(parts[2].range(), MIN_PART_SIZE * 2..MIN_PART_SIZE * 3);
    }

    #[test]
    fn test_below_minimum() {
        assert!(matches!(
            plan(12_000_000, 1_000_000),
            Err(Error::Configuration(_))
        ));

        let parts = plan(12_000_000, 6_000_000).unwrap();
        assert_eq!(parts.len(), 2);
        check_partition(&parts, 12_000_000);
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(matches!(plan(10, 0), Err(Error::Configuration(_))));
    }
}
