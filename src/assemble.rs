use crate::error::{Error, Result};
use crate::storage::PartReceipt;

/// Orders `receipts` by part number and checks they cover exactly
/// `1..=total_chunks`.
pub fn assemble(receipts: &[PartReceipt], total_chunks: usize) -> Result<Vec<PartReceipt>> {
    let mut receipts = receipts.to_vec();
    receipts.sort_by_key(|receipt| receipt.part_number);

    let mut seen = vec![false; total_chunks];
    let mut duplicate = Vec::new();
    let mut unexpected = false;
    for receipt in &receipts {
        match (receipt.part_number as usize).checked_sub(1) {
            Some(i) if i < total_chunks => {
                if seen[i] {
                    duplicate.push(receipt.part_number);
                }
                seen[i] = true;
            }
            _ => unexpected = true,
        }
    }
    duplicate.dedup();

    let missing = seen
        .iter()
        .enumerate()
        .filter(|(_, seen)| !**seen)
        .map(|(i, _)| i as u32 + 1)
        .collect::<Vec<_>>();

    if missing.is_empty() && duplicate.is_empty() && !unexpected {
        Ok(receipts)
    } else {
        Err(Error::IncompleteUpload { missing, duplicate })
    }
}
