mod common;

use std::sync::Arc;

use secure_element::{Error, ErrorKind, SecureElement, Simulator};

use crate::common::{bytes, Recorder, ScriptedTransport};

const AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10];

fn init<T>(engine: &SecureElement<T>) -> Arc<Recorder>
where
    T: secure_element::Transport,
{
    let recorder = Arc::new(Recorder::default());
    engine.init(Some(recorder.clone())).unwrap();

    recorder
}

#[test]
fn test_operations_require_init() {
    let (transport, log) = ScriptedTransport::new([bytes("9000")]);
    let engine = SecureElement::new(transport);

    let kinds = [
        engine.get_atr().map(|_| ()).unwrap_err().kind(),
        engine.is_card_present().map(|_| ()).unwrap_err().kind(),
        engine.reset().unwrap_err().kind(),
        engine.transmit(&[0x00, 0xA4, 0x04, 0x00, 0x00]).map(|_| ()).unwrap_err().kind(),
        engine.open_basic_channel(&AID, 0x00).map(|_| ()).unwrap_err().kind(),
        engine.open_logical_channel(&AID, 0x00).map(|_| ()).unwrap_err().kind(),
        engine.close_channel(1).unwrap_err().kind(),
    ];

    assert!(kinds.iter().all(|k| *k == ErrorKind::NotInitialized));
    assert!(log.lock().unwrap().sent.is_empty());
}

#[test]
fn test_open_basic_channel() {
    let (transport, log) = ScriptedTransport::new([bytes("6F 09 84 07 A0000000031010 9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    let response = engine.open_basic_channel(&AID, 0x00).unwrap();

    assert_eq!(bytes("6F 09 84 07 A0000000031010 9000"), response);
    assert_eq!(
        vec![bytes("00 A4 04 00 07 A0000000031010 00")],
        log.lock().unwrap().sent,
    );
}

#[test]
fn test_open_basic_channel_warning() {
    let (transport, _) = ScriptedTransport::new([bytes("6283")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    assert_eq!(bytes("6283"), engine.open_basic_channel(&AID, 0x00).unwrap());
}

#[test]
fn test_open_basic_channel_errors() {
    for (response, kind) in [
        ("64FF", ErrorKind::IoError),
        ("6A82", ErrorKind::Failed),
        ("6400", ErrorKind::Failed),
        ("90", ErrorKind::Failed),
    ] {
        let (transport, _) = ScriptedTransport::new([bytes(response)]);
        let engine = SecureElement::new(transport);
        init(&engine);

        assert_eq!(
            kind,
            engine.open_basic_channel(&AID, 0x00).unwrap_err().kind(),
            "response {response}",
        );
    }
}

#[test]
fn test_open_logical_channel() {
    let (transport, log) = ScriptedTransport::new([bytes("01 9000"), bytes("6F00 9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    let response = engine.open_logical_channel(&AID, 0x04).unwrap();

    assert_eq!(1, response.channel_number);
    assert_eq!(bytes("6F00 9000"), response.select_response);
    assert_eq!(
        vec![
            bytes("00 70 00 00 01"),
            bytes("01 A4 04 04 07 A0000000031010 00"),
        ],
        log.lock().unwrap().sent,
    );
    assert_eq!(2, engine.open_channels().len());
}

#[test]
fn test_open_logical_channel_supplementary_cla() {
    let (transport, log) = ScriptedTransport::new([bytes("07 9000"), bytes("9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    assert_eq!(7, engine.open_logical_channel(&AID, 0x00).unwrap().channel_number);
    assert_eq!(0x43, log.lock().unwrap().sent[1][0]);
}

#[test]
fn test_open_logical_channel_connects_first() {
    let (transport, log) = ScriptedTransport::new([bytes("01 9000"), bytes("9000")]);
    let engine = SecureElement::new(transport.disconnected());
    init(&engine);

    engine.open_logical_channel(&AID, 0x00).unwrap();
    assert_eq!(1, log.lock().unwrap().connects);
}

#[test]
fn test_open_logical_channel_connect_failure() {
    let (transport, log) = ScriptedTransport::new([bytes("01 9000"), bytes("9000")]);
    let engine = SecureElement::new(transport.refusing_connect());
    init(&engine);

    let err = engine.open_logical_channel(&AID, 0x00).unwrap_err();

    assert!(matches!(err, Error::Connect(_)));
    assert_eq!(ErrorKind::IoError, err.kind());
    assert!(log.lock().unwrap().sent.is_empty());
}

#[test]
fn test_manage_channel_not_acknowledged() {
    for response in ["6A81", "01 6310", "", "00"] {
        let (transport, log) = ScriptedTransport::new([bytes(response)]);
        let engine = SecureElement::new(transport);
        init(&engine);

        let err = engine.open_logical_channel(&AID, 0x00).unwrap_err();

        assert!(matches!(err, Error::ManageChannelRejected(_)), "{response}");
        assert_eq!(ErrorKind::IoError, err.kind());
        assert_eq!(1, log.lock().unwrap().sent.len());
    }
}

#[test]
fn test_invalid_channel_stops_before_select() {
    for response in ["00 9000", "14 9000", "FF 9000"] {
        let (transport, log) = ScriptedTransport::new([bytes(response), bytes("9000")]);
        let engine = SecureElement::new(transport);
        init(&engine);

        let err = engine.open_logical_channel(&AID, 0x00).unwrap_err();

        assert!(matches!(err, Error::InvalidChannel(_)), "{response}");
        assert_eq!(ErrorKind::IoError, err.kind());
        assert_eq!(1, log.lock().unwrap().sent.len());
        assert_eq!(1, engine.open_channels().len());
    }
}

#[test]
fn test_select_failure_leaves_nothing_allocated() {
    let (transport, log) =
        ScriptedTransport::new([bytes("02 9000"), bytes("6A82"), bytes("9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    let err = engine.open_logical_channel(&AID, 0x00).unwrap_err();

    assert_eq!(ErrorKind::Failed, err.kind());
    assert_eq!(1, engine.open_channels().len());
    assert_eq!(
        bytes("02 70 80 02 00"),
        log.lock().unwrap().sent[2],
    );
}

#[test]
fn test_select_hardware_error() {
    let (transport, _) = ScriptedTransport::new([bytes("03 9000"), bytes("64FF"), bytes("9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    assert!(matches!(
        engine.open_logical_channel(&AID, 0x00),
        Err(Error::Hardware(_))
    ));
    assert_eq!(1, engine.open_channels().len());
}

#[test]
fn test_transport_failure() {
    let (transport, _) = ScriptedTransport::broken();
    let engine = SecureElement::new(transport);
    init(&engine);

    assert_eq!(
        ErrorKind::IoError,
        engine.open_logical_channel(&AID, 0x00).unwrap_err().kind(),
    );
    assert_eq!(
        ErrorKind::IoError,
        engine.open_basic_channel(&AID, 0x00).unwrap_err().kind(),
    );
    assert_eq!(
        ErrorKind::IoError,
        engine.transmit(&[0x00, 0xB0, 0x00, 0x00, 0x00]).unwrap_err().kind(),
    );
    assert_eq!(ErrorKind::IoError, engine.close_channel(1).unwrap_err().kind());
    assert_eq!(1, engine.open_channels().len());
}

#[test]
fn test_transmit_is_passthrough() {
    let (transport, log) = ScriptedTransport::new([bytes("6A82")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    assert_eq!(bytes("6A82"), engine.transmit(&bytes("01 B0 0000 00")).unwrap());
    assert_eq!(vec![bytes("01 B0 0000 00")], log.lock().unwrap().sent);
}

#[test]
fn test_close_channel() {
    let (transport, log) =
        ScriptedTransport::new([bytes("05 9000"), bytes("9000"), bytes("9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    engine.open_logical_channel(&AID, 0x00).unwrap();
    engine.close_channel(5).unwrap();

    assert_eq!(bytes("41 70 80 05 00"), log.lock().unwrap().sent[2]);
    assert_eq!(1, engine.open_channels().len());
}

#[test]
fn test_close_channel_rejected() {
    for (response, kind) in [("6881", ErrorKind::Failed), ("", ErrorKind::Failed)] {
        let (transport, _) = ScriptedTransport::new([bytes(response)]);
        let engine = SecureElement::new(transport);
        init(&engine);

        assert_eq!(kind, engine.close_channel(2).unwrap_err().kind());
    }
}

#[test]
fn test_allocation_exhaustion_and_reuse() {
    let engine = SecureElement::new(Simulator::with_applets([AID.to_vec()]));
    init(&engine);

    let numbers = (0..19)
        .map(|_| engine.open_logical_channel(&AID, 0x00).unwrap().channel_number)
        .collect::<Vec<_>>();
    assert_eq!((1..=19).collect::<Vec<_>>(), numbers);

    assert!(matches!(
        engine.open_logical_channel(&AID, 0x00),
        Err(Error::NoChannelAvailable)
    ));

    engine.close_channel(11).unwrap();
    assert_eq!(11, engine.open_logical_channel(&AID, 0x00).unwrap().channel_number);
}

#[test]
fn test_round_trip_reuses_number() {
    let engine = SecureElement::new(Simulator::with_applets([AID.to_vec()]));
    init(&engine);

    let first = engine.open_logical_channel(&AID, 0x00).unwrap();
    engine.close_channel(first.channel_number).unwrap();
    let second = engine.open_logical_channel(&AID, 0x00).unwrap();

    assert_eq!(first.channel_number, second.channel_number);
}

#[test]
fn test_reset_notifications() {
    let engine = SecureElement::new(Simulator::new());
    let recorder = init(&engine);

    engine.reset().unwrap();

    assert_eq!(
        vec![
            (true, "init".to_string()),
            (false, "reset".to_string()),
            (true, "reset".to_string()),
        ],
        *recorder.events.lock().unwrap(),
    );
}

#[test]
fn test_channel_already_open_is_not_handed_out_twice() {
    let (transport, log) =
        ScriptedTransport::new([bytes("01 9000"), bytes("9000"), bytes("01 9000"), bytes("9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    assert_eq!(1, engine.open_logical_channel(&AID, 0x00).unwrap().channel_number);

    let err = engine.open_logical_channel(&AID, 0x00).unwrap_err();

    assert!(matches!(err, Error::ChannelInUse(1)));
    assert_eq!(ErrorKind::IoError, err.kind());

    // Neither SELECT nor CLOSE goes out on the first holder's channel.
    assert_eq!(3, log.lock().unwrap().sent.len());
    assert_eq!(
        vec![0, 1],
        engine
            .open_channels()
            .iter()
            .map(|c| c.number)
            .collect::<Vec<_>>(),
    );
}

#[test]
fn test_close_basic_channel_is_rejected() {
    let (transport, log) = ScriptedTransport::new([bytes("6881")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    let err = engine.close_channel(0).unwrap_err();

    assert!(matches!(err, Error::InvalidChannel(0)));
    assert_eq!(ErrorKind::IoError, err.kind());
    assert!(log.lock().unwrap().sent.is_empty());
}

#[test]
fn test_open_logical_channel_warning() {
    let (transport, _) = ScriptedTransport::new([bytes("02 9000"), bytes("6310")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    let response = engine.open_logical_channel(&AID, 0x00).unwrap();

    assert_eq!(2, response.channel_number);
    assert_eq!(bytes("6310"), response.select_response);
    assert_eq!(2, engine.open_channels().len());
}

#[test]
fn test_aid_length_boundary() {
    let (transport, log) = ScriptedTransport::new([bytes("9000")]);
    let engine = SecureElement::new(transport);
    init(&engine);

    let response = engine.open_basic_channel(&[0xA0; 255], 0x00).unwrap();
    assert_eq!(bytes("9000"), response);

    let sent = log.lock().unwrap().sent[0].clone();
    assert_eq!(4 + 1 + 255 + 1, sent.len());
    assert_eq!(0xFF, sent[4]);

    for err in [
        engine.open_basic_channel(&[0xA0; 256], 0x00).map(|_| ()).unwrap_err(),
        engine.open_logical_channel(&[0xA0; 256], 0x00).map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(err, Error::AidTooLong(256)));
        assert_eq!(ErrorKind::Failed, err.kind());
    }

    assert_eq!(1, log.lock().unwrap().sent.len());
}
