//! Tests for the pattern upload sequence against the simulated machine

mod common;

use common::*;
use pp1_lib::upload::Layout;
use rand::RngCore;

const DELETE: u16 = 0x0708;
const ANNOUNCE: u16 = 0x1200;
const CHUNK: u16 = 0x1201;
const IDENTIFY: u16 = 0x070A;
const LAYOUT: u16 = 0x0705;

#[tokio::test]
async fn test_upload_runs_all_steps_in_order() {
    init_tracing();
    let (pp1, machine) = simulated_session(fast_config());
    let data = zigzag_pen(500);
    assert_eq!(data.len(), 2000);

    let mut progress = Vec::new();
    let mut rng = StdRng::seed_from_u64(7);
    let uuid = pp1.upload(&data, &mut rng, |p| progress.push(p)).await.unwrap();

    assert_eq!(
        machine.commands(),
        vec![DELETE, ANNOUNCE, CHUNK, CHUNK, CHUNK, CHUNK, IDENTIFY, LAYOUT]
    );
    assert_eq!(machine.pattern().as_deref(), Some(data.as_slice()));
    assert_eq!(machine.uuid(), Some(*uuid.as_bytes()));
    assert_eq!(machine.layout(), Some(vec![0; 12]));

    assert_eq!(progress, vec![25.0, 50.0, 75.0, 100.0]);
}

#[tokio::test]
async fn test_upload_wire_payloads() {
    let (pp1, machine) = simulated_session(fast_config());
    let data = zigzag_pen(150);

    let mut rng = StdRng::seed_from_u64(1);
    pp1.upload(&data, &mut rng, |_| {}).await.unwrap();

    let writes = machine.writes();
    let announce = &writes[1];
    assert_eq!(announce[2], 0x03);
    assert_eq!(u32::from_le_bytes([announce[3], announce[4], announce[5], announce[6]]), 600);
    let sum = data.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    assert_eq!(u16::from_le_bytes([announce[7], announce[8]]), sum);

    let second_chunk = &writes[3];
    assert_eq!(&second_chunk[..6], &[0x12, 0x01, 0xF4, 0x01, 0x00, 0x00]);
    assert_eq!(second_chunk.len(), 2 + 4 + 100 + 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_with_small_chunks() {
    let config = SessionConfig {
        chunk_size: 64,
        ..fast_config()
    };
    let (pp1, machine) = simulated_session(config);
    let data = zigzag_pen(250);

    let mut progress = Vec::new();
    let mut rng = StdRng::seed_from_u64(3);
    pp1.upload(&data, &mut rng, |p| progress.push(p)).await.unwrap();

    let chunks = machine.commands().iter().filter(|&&c| c == CHUNK).count();
    assert_eq!(chunks, data.len().div_ceil(64));
    assert_eq!(progress.len(), chunks);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_id_is_the_raw_random_bytes() {
    let (pp1, machine) = simulated_session(fast_config());
    let mut expected = [0u8; 16];
    StdRng::seed_from_u64(11).fill_bytes(&mut expected);

    let uuid = pp1
        .upload(&zigzag_pen(10), &mut StdRng::seed_from_u64(11), |_| {})
        .await
        .unwrap();
    assert_eq!(*uuid.as_bytes(), expected);
    assert_eq!(machine.uuid(), Some(expected));
    assert_eq!(&machine.writes()[3][2..], &expected);
}

#[tokio::test]
async fn test_same_seed_gives_same_id() {
    let data = zigzag_pen(10);

    let (first, _) = simulated_session(fast_config());
    let a = first.upload(&data, &mut StdRng::seed_from_u64(42), |_| {}).await.unwrap();
    let (second, _) = simulated_session(fast_config());
    let b = second.upload(&data, &mut StdRng::seed_from_u64(42), |_| {}).await.unwrap();

    assert_eq!(a, b);
    let c = second.upload(&data, &mut StdRng::seed_from_u64(43), |_| {}).await.unwrap();
    assert_ne!(a, c);
}

#[tokio::test]
async fn test_empty_pattern_sends_nothing() {
    let (pp1, machine) = simulated_session(fast_config());
    let err = pp1
        .upload(&[], &mut StdRng::seed_from_u64(0), |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyPattern);
    assert!(machine.commands().is_empty());
}

#[tokio::test]
async fn test_announce_rejection_stops_upload() {
    let (pp1, machine) = simulated_session(fast_config());
    machine.set_faults(Faults {
        reject_announce: Some(0x05),
        ..Faults::default()
    });

    let mut progress = Vec::new();
    let err = pp1
        .upload(&zigzag_pen(100), &mut StdRng::seed_from_u64(0), |p| progress.push(p))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PP1Error::UploadRejected {
            step: UploadStep::Announce,
            code: 0x05
        }
    ));
    assert_eq!(machine.commands(), vec![DELETE, ANNOUNCE]);
    assert!(progress.is_empty());
    assert!(!err.is_retry_safe());
}

#[tokio::test]
async fn test_identify_rejection_keeps_transferred_data() {
    let (pp1, machine) = simulated_session(fast_config());
    machine.set_faults(Faults {
        reject_uuid: Some(0x01),
        ..Faults::default()
    });
    let data = zigzag_pen(100);

    let err = pp1
        .upload(&data, &mut StdRng::seed_from_u64(0), |_| {})
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UploadRejected);
    assert_eq!(err.upload_step(), Some(UploadStep::Identify));
    assert_eq!(machine.pattern(), Some(data));
    assert!(machine.uuid().is_none());
    assert!(machine.layout().is_none());
    assert_eq!(machine.commands().last(), Some(&IDENTIFY));
}

#[tokio::test]
async fn test_transfer_without_completion_fails() {
    let (pp1, machine) = simulated_session(fast_config());
    machine.set_faults(Faults {
        never_complete: true,
        ..Faults::default()
    });
    let data = zigzag_pen(300);

    let mut progress = Vec::new();
    let err = pp1
        .upload(&data, &mut StdRng::seed_from_u64(0), |p| progress.push(p))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransferIncomplete);
    assert_eq!(err.upload_step(), Some(UploadStep::Transfer));
    assert!(matches!(err, PP1Error::TransferIncomplete { sent: 1200, total: 1200 }));
    assert!(progress.iter().all(|&p| p < 100.0));
    assert!(!machine.commands().contains(&IDENTIFY));
}

#[tokio::test]
async fn test_early_completion_ends_transfer() {
    let (pp1, machine) = simulated_session(fast_config());
    machine.set_faults(Faults {
        complete_at: Some(500),
        ..Faults::default()
    });

    let mut progress = Vec::new();
    pp1.upload(&zigzag_pen(400), &mut StdRng::seed_from_u64(0), |p| progress.push(p))
        .await
        .unwrap();

    assert_eq!(progress, vec![100.0]);
    assert_eq!(machine.commands(), vec![DELETE, ANNOUNCE, CHUNK, IDENTIFY, LAYOUT]);
}

#[tokio::test]
async fn test_transport_failure_names_the_step() {
    let (pp1, machine) = simulated_session(fast_config());
    machine.set_faults(Faults {
        fail_read: Some(CommandId::SendData),
        ..Faults::default()
    });

    let err = pp1
        .upload(&zigzag_pen(100), &mut StdRng::seed_from_u64(0), |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.upload_step(), Some(UploadStep::Transfer));
    assert!(err.to_string().contains("Transfer"), "{err}");

    // The session stays usable after a failed upload.
    machine.set_faults(Faults::default());
    assert!(pp1.get_machine_state().await.is_ok());
}

#[tokio::test]
async fn test_upload_requires_connection() {
    let pp1 = PP1::new(fast_config());
    let err = pp1
        .upload(&zigzag_pen(10), &mut StdRng::seed_from_u64(0), |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert_eq!(err.upload_step(), Some(UploadStep::Delete));
    assert!(err.is_retry_safe());
}

#[tokio::test]
async fn test_upload_with_layout() {
    let (pp1, machine) = simulated_session(fast_config());
    let layout = Layout {
        move_x: 100,
        move_y: -100,
        rotate: 90,
        ..Layout::default()
    };

    pp1.upload_with_layout(&zigzag_pen(10), layout, &mut StdRng::seed_from_u64(0), |_| {})
        .await
        .unwrap();
    assert_eq!(machine.layout(), Some(layout.to_payload().to_vec()));
}
