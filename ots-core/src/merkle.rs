//! Pairwise aggregation of timestamps into a single commitment
//!
//! Many file timestamps are combined by repeatedly joining pairs with
//! append/prepend edges followed by a SHA-256, so every input tree ends up
//! containing its own path to the shared tip. Only the tip needs to be
//! submitted to calendars; fragments rooted at it can later be merged back
//! into every file's tree.

use ots_types::{Error, Op, Result, Timestamp};

/// Join two timestamps so both commit to `sha256(left.msg ‖ right.msg)`.
///
/// Both trees gain the edges leading to the shared node; the combined
/// message is returned.
pub fn cat_sha256(left: &mut Timestamp, right: &mut Timestamp) -> Result<Vec<u8>> {
    let left_msg = left.msg().to_vec();
    let right_msg = right.msg().to_vec();
    let tip = left
        .add_op(Op::Append(right_msg))?
        .add_op(Op::Sha256)?
        .msg()
        .to_vec();
    right.add_op(Op::Prepend(left_msg))?.add_op(Op::Sha256)?;
    Ok(tip)
}

/// Merkelize a set of timestamps in place.
///
/// Structurally a merkle-mountain-range: pairs are joined level by level
/// and an odd tree carries over to the next round. Afterwards each input
/// tree contains the full operation path from its own message to the
/// returned tip message.
pub fn make_merkle_tree(stamps: &mut [Timestamp]) -> Result<Vec<u8>> {
    if stamps.is_empty() {
        return Err(Error::EmptyTimestamp);
    }
    // each group tracks a frontier message and the stamps whose trees reach it
    let mut groups: Vec<(Vec<u8>, Vec<usize>)> = stamps
        .iter()
        .enumerate()
        .map(|(i, stamp)| (stamp.msg().to_vec(), vec![i]))
        .collect();

    while groups.len() > 1 {
        let mut next = Vec::with_capacity(groups.len() / 2 + 1);
        let mut iter = groups.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => next.push(join_groups(stamps, left, right)?),
                None => next.push(left),
            }
        }
        groups = next;
    }

    let (tip, _) = groups.remove(0);
    Ok(tip)
}

fn join_groups(
    stamps: &mut [Timestamp],
    left: (Vec<u8>, Vec<usize>),
    right: (Vec<u8>, Vec<usize>),
) -> Result<(Vec<u8>, Vec<usize>)> {
    let (left_msg, mut left_members) = left;
    let (right_msg, right_members) = right;

    let mut left_chain = Timestamp::new(left_msg.clone())?;
    let mut right_chain = Timestamp::new(right_msg.clone())?;
    let tip = cat_sha256(&mut left_chain, &mut right_chain)?;

    for &i in &left_members {
        stamps[i].merge_at(&left_msg, &left_chain)?;
    }
    for &i in &right_members {
        stamps[i].merge_at(&right_msg, &right_chain)?;
    }

    left_members.extend(right_members);
    Ok((tip, left_members))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_types::Attestation;

    fn stamps(n: u8) -> Vec<Timestamp> {
        (0..n)
            .map(|i| Timestamp::new(vec![i; 32]).unwrap())
            .collect()
    }

    /// The tip must be reachable from every stamp by replaying its ops.
    fn tip_of(stamp: &Timestamp) -> Vec<u8> {
        let mut node = stamp;
        while let Some(child) = node.ops.values().next() {
            assert_eq!(node.ops.len(), 1, "aggregation paths never branch");
            node = child;
        }
        node.msg().to_vec()
    }

    #[test]
    fn single_stamp_is_its_own_tip() {
        let mut stamps = stamps(1);
        let tip = make_merkle_tree(&mut stamps).unwrap();
        assert_eq!(tip, stamps[0].msg());
        assert!(stamps[0].ops.is_empty());
    }

    #[test]
    fn pair_combines_with_append_and_prepend() {
        let mut pair = stamps(2);
        let tip = make_merkle_tree(&mut pair).unwrap();

        let expected = Op::Sha256
            .apply(&[vec![0u8; 32], vec![1u8; 32]].concat())
            .unwrap();
        assert_eq!(tip, expected);

        assert!(pair[0].ops.contains_key(&Op::Append(vec![1; 32])));
        assert!(pair[1].ops.contains_key(&Op::Prepend(vec![0; 32])));
        assert_eq!(tip_of(&pair[0]), tip);
        assert_eq!(tip_of(&pair[1]), tip);
    }

    #[test]
    fn every_stamp_reaches_the_tip() {
        for n in [3u8, 4, 5, 7, 8] {
            let mut all = stamps(n);
            let tip = make_merkle_tree(&mut all).unwrap();
            for stamp in &all {
                assert_eq!(tip_of(stamp), tip, "stamp lost its path with n={n}");
            }
        }
    }

    #[test]
    fn fragment_merged_at_tip_completes_every_stamp() {
        let mut all = stamps(5);
        let tip = make_merkle_tree(&mut all).unwrap();

        let mut fragment = Timestamp::new(tip.clone()).unwrap();
        fragment.add_attestation(Attestation::Bitcoin { height: 100 });

        for stamp in all.iter_mut() {
            assert!(stamp.merge_at(&tip, &fragment).unwrap());
            assert!(stamp.is_complete());
        }
    }

    #[test]
    fn empty_input_rejected() {
        assert!(make_merkle_tree(&mut []).is_err());
    }
}
