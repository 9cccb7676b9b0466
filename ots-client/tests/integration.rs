//! End-to-end stamping, upgrading and verification against in-process
//! stub calendars and a static block-header oracle.

use std::sync::{Arc, Mutex};

use ots_client::testutil::{
    bitcoin_fragment, bitcoin_fragment_root, pending_fragment, StaticOracle, StubCalendar,
};
use ots_client::upgrader::{UpgradeOptions, Upgrader};
use ots_client::verifier::{verify_timestamp, Outcome};
use ots_client::{Calendar, ClientError, StampPolicy, Stamper};
use ots_core::{BlockHeader, Chain};
use ots_types::{Attestation, DetachedTimestampFile, Op, Timestamp};

const HELLO_WORLD: &[u8] = b"Hello World!\n";
const HELLO_WORLD_SHA256: &str =
    "03ba204e50d126e4674c005e04d82e84c21366780af1f43bd54a37816b6ab340";

const BLOCK_HEIGHT: u64 = 358391;
// 2015-05-28, the day the block was mined
const BLOCK_TIME: u32 = 1_432_825_200;

fn hello_digest() -> Vec<u8> {
    let digest = Op::Sha256.apply(HELLO_WORLD).unwrap();
    assert_eq!(hex::encode(&digest), HELLO_WORLD_SHA256);
    digest
}

fn one_calendar_stamper(url: &str) -> Stamper {
    let calendars: Vec<Arc<dyn Calendar>> = vec![Arc::new(StubCalendar::new(url))];
    Stamper::new(
        calendars,
        StampPolicy {
            min_responses: 1,
            ..StampPolicy::default()
        },
    )
}

#[tokio::test]
async fn stamping_hello_world_yields_pending_proof() {
    let stamper = one_calendar_stamper("https://cal.example");
    let stamped = stamper
        .stamp(Op::Sha256, vec![hello_digest()])
        .await
        .unwrap();
    assert_eq!(stamped.len(), 1);
    let detached = &stamped[0];

    assert_eq!(hex::encode(detached.file_digest()), HELLO_WORLD_SHA256);

    let pending: Vec<_> = detached
        .timestamp
        .all_attestations()
        .filter_map(|(_, attestation)| match attestation {
            Attestation::Pending { uri } => Some(uri.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(pending, vec!["https://cal.example".to_string()]);
    assert!(!detached.timestamp.is_complete());

    // the proof survives a disk roundtrip
    let bytes = detached.to_bytes().unwrap();
    let decoded = DetachedTimestampFile::from_bytes(&bytes).unwrap();
    assert_eq!(&decoded, detached);
}

#[tokio::test]
async fn stamping_twice_shows_calendars_different_commitments() {
    let submitted = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let log = Arc::clone(&submitted);
    let calendar = StubCalendar::new("https://cal.example").on_submit(move |commitment| {
        log.lock().unwrap().push(commitment.to_vec());
        pending_fragment(commitment, "https://cal.example")
    });
    let stamper = Stamper::new(
        vec![Arc::new(calendar) as Arc<dyn Calendar>],
        StampPolicy {
            min_responses: 1,
            ..StampPolicy::default()
        },
    );

    stamper
        .stamp(Op::Sha256, vec![hello_digest()])
        .await
        .unwrap();
    stamper
        .stamp(Op::Sha256, vec![hello_digest()])
        .await
        .unwrap();

    let submitted = submitted.lock().unwrap();
    assert_eq!(submitted.len(), 2);
    // the nonce hides the (identical) file digest from the calendar
    assert_ne!(submitted[0], submitted[1]);
    assert_ne!(submitted[0], hello_digest());
}

#[tokio::test]
async fn stamping_many_files_shares_one_submission() {
    let submitted = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let log = Arc::clone(&submitted);
    let calendar = StubCalendar::new("https://cal.example").on_submit(move |commitment| {
        log.lock().unwrap().push(commitment.to_vec());
        pending_fragment(commitment, "https://cal.example")
    });
    let stamper = Stamper::new(
        vec![Arc::new(calendar) as Arc<dyn Calendar>],
        StampPolicy {
            min_responses: 1,
            ..StampPolicy::default()
        },
    );

    let digests: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i; 32]).collect();
    let stamped = stamper.stamp(Op::Sha256, digests.clone()).await.unwrap();

    assert_eq!(submitted.lock().unwrap().len(), 1, "one merkle tip submitted");
    assert_eq!(stamped.len(), 5);
    for (digest, detached) in digests.iter().zip(&stamped) {
        assert_eq!(detached.file_digest(), digest.as_slice());
        // every file's tree reaches the calendar's pending leaf
        assert!(detached
            .timestamp
            .all_attestations()
            .any(|(_, a)| matches!(a, Attestation::Pending { .. })));
        // and roundtrips through the codec
        let bytes = detached.to_bytes().unwrap();
        assert_eq!(
            DetachedTimestampFile::from_bytes(&bytes).unwrap(),
            *detached
        );
    }
}

#[tokio::test]
async fn upgrade_completes_pending_proof_and_is_idempotent() {
    let stamper = one_calendar_stamper("https://cal.example");
    let mut stamped = stamper
        .stamp(Op::Sha256, vec![hello_digest()])
        .await
        .unwrap();
    let detached = &mut stamped[0];

    let upgrader = Upgrader::new(
        UpgradeOptions {
            calendar_urls: Vec::new(),
            whitelist: Some(vec!["https://cal.example".into()]),
        },
        None,
    )
    .with_factory(Box::new(|url| {
        let stub = StubCalendar::new(url).on_get(|commitment| {
            bitcoin_fragment(commitment, b"block-prefix", BLOCK_HEIGHT)
        });
        Ok(Arc::new(stub) as Arc<dyn Calendar>)
    }));

    let changed = upgrader.upgrade(&mut detached.timestamp).await.unwrap();
    assert!(changed);
    assert!(detached.timestamp.is_complete());

    // upgrading a complete timestamp changes nothing
    let bytes = detached.to_bytes().unwrap();
    let changed = upgrader.upgrade(&mut detached.timestamp).await.unwrap();
    assert!(!changed);
    assert_eq!(detached.to_bytes().unwrap(), bytes);
}

#[tokio::test]
async fn verify_reports_block_height_and_time() {
    let commitment = hello_digest();
    let mut stamp = Timestamp::new(commitment.clone()).unwrap();
    stamp
        .merge(bitcoin_fragment(&commitment, b"block-prefix", BLOCK_HEIGHT).unwrap())
        .unwrap();

    let root = bitcoin_fragment_root(&commitment, b"block-prefix").unwrap();
    let oracle = StaticOracle::new().with_header(
        Chain::Bitcoin,
        BLOCK_HEIGHT,
        BlockHeader {
            merkle_root: root,
            time: BLOCK_TIME,
        },
    );

    match verify_timestamp(&stamp, &oracle).await.unwrap() {
        Outcome::Verified { blocks, earliest } => {
            assert_eq!(blocks.len(), 1);
            assert_eq!(blocks[0].height, BLOCK_HEIGHT);
            assert_eq!(earliest, BLOCK_TIME);
        }
        other => panic!("expected verified outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn verify_reports_minimum_time_across_attestations() {
    let commitment = hello_digest();
    let mut stamp = Timestamp::new(commitment.clone()).unwrap();
    stamp
        .merge(bitcoin_fragment(&commitment, b"early", 100).unwrap())
        .unwrap();
    stamp
        .merge(bitcoin_fragment(&commitment, b"late", 200).unwrap())
        .unwrap();

    let oracle = StaticOracle::new()
        .with_header(
            Chain::Bitcoin,
            100,
            BlockHeader {
                merkle_root: bitcoin_fragment_root(&commitment, b"early").unwrap(),
                time: 1_000,
            },
        )
        .with_header(
            Chain::Bitcoin,
            200,
            BlockHeader {
                merkle_root: bitcoin_fragment_root(&commitment, b"late").unwrap(),
                time: 2_000,
            },
        );

    match verify_timestamp(&stamp, &oracle).await.unwrap() {
        Outcome::Verified { blocks, earliest } => {
            assert_eq!(blocks.len(), 2);
            assert_eq!(earliest, 1_000);
        }
        other => panic!("expected verified outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn verify_detects_merkle_root_mismatch() {
    let commitment = hello_digest();
    let mut stamp = Timestamp::new(commitment.clone()).unwrap();
    stamp
        .add_op(Op::Sha256)
        .unwrap()
        .add_attestation(Attestation::Bitcoin {
            height: BLOCK_HEIGHT,
        });

    let oracle = StaticOracle::new().with_header(
        Chain::Bitcoin,
        BLOCK_HEIGHT,
        BlockHeader {
            merkle_root: [0x42; 32],
            time: BLOCK_TIME,
        },
    );

    let err = verify_timestamp(&stamp, &oracle).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Verify(ots_core::VerifyError::AttestationMismatch {
            chain: Chain::Bitcoin,
            height: BLOCK_HEIGHT,
        })
    ));
}

#[tokio::test]
async fn verify_with_only_unknown_attestation_is_unverifiable() {
    let mut stamp = Timestamp::new(hello_digest()).unwrap();
    stamp.add_attestation(Attestation::Unknown {
        tag: [0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4],
        payload: vec![1, 2, 3],
    });

    // the proof still roundtrips bit-identically
    let bytes = stamp.to_bytes().unwrap();
    let decoded = Timestamp::from_bytes(&bytes, hello_digest()).unwrap();
    assert_eq!(decoded.to_bytes().unwrap(), bytes);

    let err = verify_timestamp(&decoded, &StaticOracle::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Verify(ots_core::VerifyError::NoVerifiableAttestation)
    ));
}

#[tokio::test]
async fn verify_pending_proof_names_owed_calendars() {
    let commitment = hello_digest();
    let mut stamp = Timestamp::new(commitment.clone()).unwrap();
    stamp
        .merge(pending_fragment(&commitment, "https://cal.example").unwrap())
        .unwrap();

    match verify_timestamp(&stamp, &StaticOracle::new()).await.unwrap() {
        Outcome::Pending { calendars } => {
            assert_eq!(calendars, vec!["https://cal.example".to_string()]);
        }
        other => panic!("expected pending outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn fragments_merge_identically_in_either_order() {
    let commitment = hello_digest();
    let fragment_a = pending_fragment(&commitment, "https://a.example").unwrap();
    let fragment_b = bitcoin_fragment(&commitment, b"prefix", BLOCK_HEIGHT).unwrap();

    let mut ab = Timestamp::new(commitment.clone()).unwrap();
    ab.merge(fragment_a.clone()).unwrap();
    ab.merge(fragment_b.clone()).unwrap();

    let mut ba = Timestamp::new(commitment).unwrap();
    ba.merge(fragment_b).unwrap();
    ba.merge(fragment_a).unwrap();

    assert_eq!(ab.to_bytes().unwrap(), ba.to_bytes().unwrap());
}
