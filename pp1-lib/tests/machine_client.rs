//! Tests for the machine state reads and controls

mod common;

use common::*;
use pp1_lib::response::MachineStatus;
use pp1_lib::stitch::color_blocks;
use pp1_lib::timing::pattern_time;

#[tokio::test]
async fn test_machine_info() {
    let identity = MachineIdentity {
        serial_number: "PP1234567".to_string(),
        software_version: 123,
        software_revision: 4,
        max_width: 1000,
        max_height: 1040,
        ..MachineIdentity::default()
    };
    let machine = SimulatedMachine::new(identity);
    let pp1 = PP1::new(fast_config());
    pp1.connect(machine);

    let info = pp1.get_machine_info().await.unwrap();
    assert_eq!(info.serial_number, "PP1234567");
    assert_eq!(info.model_number, "PP1");
    assert_eq!(info.software_version, "1.23.4");
    assert_eq!(info.bluetooth_version, 5);
    assert_eq!((info.max_width, info.max_height), (1000, 1040));
    assert_eq!(info.mac_address, "00:80:92:12:34:56");
}

#[tokio::test]
async fn test_machine_state_follows_machine() {
    let (pp1, machine) = simulated_session(fast_config());

    let state = pp1.get_machine_state().await.unwrap();
    assert_eq!(state.status, MachineStatus::Idle);
    assert_eq!(state.error, 0);
    assert!(state.status.can_upload_pattern());

    machine.set_status(MachineStatus::Pause);
    let state = pp1.get_machine_state().await.unwrap();
    assert_eq!(state.status, MachineStatus::Pause);
    assert!(state.status.can_resume_sewing());
}

#[tokio::test]
async fn test_no_pattern_loaded() {
    let (pp1, _machine) = simulated_session(fast_config());
    assert_eq!(pp1.get_pattern_uuid().await.unwrap(), None);

    let info = pp1.get_pattern_info().await.unwrap();
    assert_eq!(info.total_stitches, 0);
}

#[tokio::test]
async fn test_sewing_session() {
    init_tracing();
    let (pp1, machine) = simulated_session(fast_config());
    let stitches = zigzag(120);
    let encoded = encode(&stitches).unwrap();

    let info = pp1.get_machine_info().await.unwrap();
    assert!(encoded.bounds.fits_hoop(info.max_width, info.max_height).is_ok());

    let uuid = pp1
        .upload(&encoded.bytes, &mut StdRng::seed_from_u64(9), |_| {})
        .await
        .unwrap();
    assert_eq!(pp1.get_pattern_uuid().await.unwrap(), Some(uuid));

    let pattern = pp1.get_pattern_info().await.unwrap();
    assert_eq!(usize::from(pattern.total_stitches), encoded.record_count());
    assert_eq!(i32::from(pattern.bound_left), encoded.bounds.min_x);
    assert_eq!(i32::from(pattern.bound_right), encoded.bounds.max_x);
    assert_eq!(i32::from(pattern.bound_bottom), encoded.bounds.max_y);

    let state = pp1.get_machine_state().await.unwrap();
    assert_eq!(state.status, MachineStatus::SewingWait);

    pp1.start_mask_trace().await.unwrap();
    assert_eq!(machine.writes().last().unwrap().as_ref(), &[0x07, 0x04, 0x01]);
    let state = pp1.get_machine_state().await.unwrap();
    assert_eq!(state.status, MachineStatus::MaskTraceComplete);
    assert!(state.status.can_start_sewing());

    pp1.start_sewing().await.unwrap();
    assert_eq!(pp1.get_machine_state().await.unwrap().status, MachineStatus::Sewing);

    machine.set_current_stitch(60);
    let progress = pp1.get_sewing_progress().await.unwrap();
    assert_eq!(progress.current_stitch, 60);

    let time = pattern_time(&color_blocks(&stitches), usize::from(progress.current_stitch));
    assert_eq!(time.total_minutes, 1);
    assert_eq!(time.elapsed_minutes + time.remaining_minutes, time.total_minutes);

    pp1.delete_design().await.unwrap();
    assert_eq!(pp1.get_pattern_uuid().await.unwrap(), None);
    assert!(machine.pattern().is_none());
}

#[tokio::test]
async fn test_resume_and_clear_error_commands() {
    let (pp1, machine) = simulated_session(fast_config());
    pp1.resume_sewing().await.unwrap();
    pp1.clear_error().await.unwrap();
    assert_eq!(machine.commands(), vec![0x070E, 0x1300]);
}

#[tokio::test]
async fn test_read_failure_does_not_stall_session() {
    let (pp1, machine) = simulated_session(fast_config());
    machine.set_faults(Faults {
        fail_read: Some(CommandId::MachineInfo),
        ..Faults::default()
    });

    let (info, state) = tokio::join!(pp1.get_machine_info(), pp1.get_machine_state());
    assert_eq!(info.unwrap_err().kind(), ErrorKind::Transport);
    assert_eq!(state.unwrap().status, MachineStatus::Idle);
}

#[tokio::test]
async fn test_disconnect() {
    let (pp1, _machine) = simulated_session(fast_config());
    assert!(pp1.is_connected());
    pp1.disconnect();
    assert!(!pp1.is_connected());

    let err = pp1.get_machine_state().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
}
