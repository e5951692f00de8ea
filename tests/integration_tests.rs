use hdlc_link::codec;
use hdlc_link::simulator::{duplex, FaultPlan, ScriptedTransport};
use hdlc_link::{Address, Control, Frame, LinkConfig, LinkError, Role, Seq, Session, SessionState, Transport};
use std::thread;
use std::time::{Duration, Instant};

mod link_harness {
    use super::*;
    use hdlc_link::simulator::ChannelTransport;

    pub fn config(role: Role) -> LinkConfig {
        LinkConfig::new(role)
            .with_retry_budget(5)
            .with_ack_timeout(Duration::from_millis(100))
    }

    /// Outcome of the receiving thread
    pub struct Received {
        pub payloads: Vec<Vec<u8>>,
        pub expected_rx_seq: Seq,
        pub close: hdlc_link::Result<()>,
        pub state: SessionState,
        pub stats: hdlc_link::Statistics,
    }

    /// Run a receiver that reads `count` payloads and closes, on its own thread
    pub fn spawn_receiver(
        transport: ChannelTransport,
        config: LinkConfig,
        count: usize,
    ) -> thread::JoinHandle<Received> {
        thread::spawn(move || {
            let mut session = Session::open(transport, config).expect("receiver open failed");
            let payloads = (0..count)
                .map(|_| session.read().expect("read failed"))
                .collect();
            let expected_rx_seq = session.expected_rx_seq();
            let close = session.close(true);
            Received {
                payloads,
                expected_rx_seq,
                close,
                state: session.state(),
                stats: session.statistics().clone(),
            }
        })
    }

    pub fn supervisory(address: Address, control: Control) -> Vec<u8> {
        codec::encode(&Frame::supervisory(address, control))
    }
}

use link_harness::{config, spawn_receiver, supervisory};

#[test]
fn test_handshake_transfer_and_teardown() {
    let (tx_line, rx_line) = duplex(FaultPlan::clean(), FaultPlan::clean());
    let receiver = spawn_receiver(rx_line, config(Role::Receiver), 3);

    let mut tx = Session::open(tx_line, config(Role::Transmitter)).unwrap();
    assert_eq!(tx.state(), SessionState::Open);
    let payloads: [&[u8]; 3] = [b"alpha", b"", b"gamma"];
    for payload in payloads {
        tx.write(payload).unwrap();
    }
    tx.close(true).unwrap();
    assert_eq!(tx.state(), SessionState::Closed);

    // Double close is a no-op.
    assert!(tx.close(false).is_ok());

    let rx = receiver.join().unwrap();
    assert_eq!(rx.payloads, vec![b"alpha".to_vec(), Vec::new(), b"gamma".to_vec()]);
    assert!(rx.close.is_ok());
    assert_eq!(rx.state, SessionState::Closed);

    println!("✓ Handshake, 3 payloads and teardown completed");
}

#[test]
fn test_lost_ua_costs_one_set_retransmission() {
    // The receiver's first write is its UA; lose it.
    let (tx_line, rx_line) = duplex(FaultPlan::clean(), FaultPlan::dropping([0]));
    let tap = tx_line.tap();
    let receiver = spawn_receiver(rx_line, config(Role::Receiver), 1);

    let config = config(Role::Transmitter).with_ack_timeout(Duration::from_millis(200));
    let mut tx = Session::open(tx_line, config).unwrap();
    assert_eq!(tap.count_of(&supervisory(Address::Transmitter, Control::Set)), 2);
    assert_eq!(tx.statistics().retransmissions, 1);

    tx.write(b"after reconnect").unwrap();
    tx.close(false).unwrap();

    let rx = receiver.join().unwrap();
    assert_eq!(rx.payloads, vec![b"after reconnect".to_vec()]);

    println!("✓ Lost UA: open succeeded after exactly one SET retransmission");
}

#[test]
fn test_reserved_bytes_are_escaped_on_the_wire() {
    let (tx_line, rx_line) = duplex(FaultPlan::clean(), FaultPlan::clean());
    let tap = tx_line.tap();
    let receiver = spawn_receiver(rx_line, config(Role::Receiver), 1);

    let payload = [0x7E, 0x01, 0x7D];
    let mut tx = Session::open(tx_line, config(Role::Transmitter)).unwrap();
    tx.write(&payload).unwrap();
    tx.close(false).unwrap();

    let info = tap
        .writes()
        .into_iter()
        .find(|w| w.len() > 5 && w[2] == Control::Info(Seq::Zero).as_byte())
        .unwrap();
    // FLAG A C BCC1 | 7D 5E 01 7D 5D | BCC2 | FLAG
    assert_eq!(&info[4..9], &[0x7D, 0x5E, 0x01, 0x7D, 0x5D]);
    assert!(!info[1..info.len() - 1].contains(&0x7E));

    let rx = receiver.join().unwrap();
    assert_eq!(rx.payloads, vec![payload.to_vec()]);

    println!("✓ FLAG and ESCAPE stuffed on the wire, payload intact at the peer");
}

#[test]
fn test_sequence_numbers_stay_in_step() {
    for k in [1usize, 2, 5] {
        let (tx_line, rx_line) = duplex(FaultPlan::clean(), FaultPlan::clean());
        let receiver = spawn_receiver(rx_line, config(Role::Receiver), k);

        let mut tx = Session::open(tx_line, config(Role::Transmitter)).unwrap();
        for i in 0..k {
            tx.write(&[i as u8; 16]).unwrap();
        }
        let next = tx.next_tx_seq();
        assert_eq!(next, if k % 2 == 0 { Seq::Zero } else { Seq::One });
        tx.close(false).unwrap();

        let rx = receiver.join().unwrap();
        assert_eq!(rx.expected_rx_seq, next);
        assert_eq!(rx.payloads.len(), k);
    }

    println!("✓ Sequence numbers agree after 1, 2 and 5 writes");
}

#[test]
fn test_replayed_frame_is_delivered_once() {
    let frame = codec::encode(&Frame::information(Seq::Zero, b"exactly once".to_vec()));
    let mut inbound = supervisory(Address::Transmitter, Control::Set);
    inbound.extend(&frame);
    inbound.extend(&frame);
    inbound.extend(supervisory(Address::Transmitter, Control::Disc));

    let ua = supervisory(Address::Receiver, Control::Ua);
    let transport = ScriptedTransport::new(move |_, bytes| {
        if bytes[2] == Control::Disc.as_byte() {
            ua.clone()
        } else {
            Vec::new()
        }
    })
    .with_inbound(&inbound);

    let mut rx = Session::open(transport, config(Role::Receiver)).unwrap();
    assert_eq!(rx.read().unwrap(), b"exactly once");
    rx.close(false).unwrap();

    let rr: Vec<_> = rx
        .transport()
        .written()
        .iter()
        .filter(|w| matches!(Control::from_byte(w[2]), Some(Control::Rr(_))))
        .cloned()
        .collect();
    assert_eq!(rr.len(), 2);
    assert_eq!(rr[0], rr[1]);
    assert_eq!(rr[0], supervisory(Address::Transmitter, Control::Rr(Seq::One)));
    assert_eq!(rx.statistics().duplicates, 1);
    assert_eq!(rx.statistics().bytes_delivered, 12);

    println!("✓ Duplicate suppression: 1 delivery, 2 matching RR replies");
}

#[test]
fn test_retry_budget_bounds_transmissions() {
    for budget in [0u32, 2] {
        let (tx_line, rx_line) = duplex(FaultPlan::clean(), FaultPlan::clean());
        let tap = tx_line.tap();
        let config = LinkConfig::new(Role::Transmitter)
            .with_retry_budget(budget)
            .with_ack_timeout(Duration::from_millis(20));

        let started = Instant::now();
        let err = Session::open(tx_line, config).unwrap_err();
        assert!(matches!(err, LinkError::LinkTimeout { attempts, awaiting: "UA" } if attempts == budget + 1));
        assert_eq!(tap.count() as u32, budget + 1);
        assert!(started.elapsed() >= Duration::from_millis(20) * (budget + 1));
        drop(rx_line);
    }

    println!("✓ Retry budget: exactly budget + 1 transmissions before LinkTimeout");
}

#[test]
fn test_receiver_resyncs_through_line_noise() {
    let (mut raw, rx_line) = duplex(FaultPlan::clean(), FaultPlan::clean());
    let noise = [0x00, 0x7E, 0x03, 0x99, 0x7D, 0x7E, 0x7E, 0x01, 0x0B, 0x55];

    raw.write_bytes(&noise).unwrap();
    raw.write_bytes(&supervisory(Address::Transmitter, Control::Set)).unwrap();
    raw.write_bytes(&noise).unwrap();
    raw.write_bytes(&codec::encode(&Frame::information(Seq::Zero, vec![1, 2, 3])))
        .unwrap();

    let mut rx = Session::open(rx_line, config(Role::Receiver)).unwrap();
    assert_eq!(rx.read().unwrap(), vec![1, 2, 3]);

    let mut replies = Vec::new();
    while let Some(byte) = raw.read_byte().unwrap() {
        replies.push(byte);
    }
    let mut expected = supervisory(Address::Transmitter, Control::Ua);
    expected.extend(supervisory(Address::Transmitter, Control::Rr(Seq::One)));
    assert_eq!(replies, expected);

    println!("✓ Resync: noise before frames discarded, frames recovered");
}

#[test]
fn test_corrupted_information_frame_recovers() {
    // Writes: #0 SET, #1 first I-frame (corrupted).
    let (tx_line, rx_line) = duplex(FaultPlan::corrupting([1]).with_seed(42), FaultPlan::clean());
    let tap = tx_line.tap();
    let receiver = spawn_receiver(rx_line, config(Role::Receiver), 1);

    let mut tx = Session::open(tx_line, config(Role::Transmitter)).unwrap();
    tx.write(b"abcdefgh").unwrap();
    assert!(tx.statistics().retransmissions >= 1);
    tx.close(false).unwrap();

    let info = codec::encode(&Frame::information(Seq::Zero, b"abcdefgh".to_vec()));
    assert!(tap.count_of(&info) >= 2);

    let rx = receiver.join().unwrap();
    assert_eq!(rx.payloads, vec![b"abcdefgh".to_vec()]);
    // Either the payload checksum caught it (REJ) or the header did (resync).
    assert!(rx.stats.frames_rejected + rx.stats.resyncs >= 1);

    println!("✓ Corrupted frame detected and retransmitted");
}

#[test]
fn test_close_releases_transport_after_failed_teardown() {
    let ua = supervisory(Address::Transmitter, Control::Ua);
    let transport = ScriptedTransport::new(move |index, _| if index == 0 { ua.clone() } else { Vec::new() });
    let config = LinkConfig::new(Role::Transmitter)
        .with_retry_budget(1)
        .with_ack_timeout(Duration::from_millis(10));

    let mut tx = Session::open(transport, config).unwrap();
    let err = tx.close(true).unwrap_err();
    assert!(err.is_timeout());
    assert!(tx.transport().is_closed());
    assert_eq!(tx.state(), SessionState::Closed);
    assert!(tx.close(true).is_ok());

    println!("✓ Close: transport released even when DISC goes unanswered");
}

#[test]
fn test_write_timeout_ends_transfers() {
    let (tx_line, mut rx_line) = duplex(FaultPlan::clean(), FaultPlan::clean());
    let tap = tx_line.tap();
    rx_line.write_bytes(&supervisory(Address::Transmitter, Control::Ua)).unwrap();

    let config = LinkConfig::new(Role::Transmitter)
        .with_retry_budget(0)
        .with_ack_timeout(Duration::from_millis(20));
    let mut tx = Session::open(tx_line, config).unwrap();

    assert!(tx.write(b"lost").unwrap_err().is_timeout());
    assert_eq!(tx.state(), SessionState::Failed);
    let sent = tap.count();
    assert!(matches!(tx.write(b"again"), Err(LinkError::NotOpen { state: SessionState::Failed })));
    assert_eq!(tap.count(), sent);

    assert!(tx.close(false).unwrap_err().is_timeout());
    assert_eq!(tx.state(), SessionState::Closed);

    println!("✓ Write timeout: session failed, nothing more sent until close");
}

#[test]
fn test_transfer_over_lossy_line() {
    let tx_plan = FaultPlan::clean().with_loss_rate(0.2).with_seed(7);
    let rx_plan = FaultPlan::clean().with_loss_rate(0.2).with_seed(11);
    let (tx_line, rx_line) = duplex(tx_plan, rx_plan);

    let lossy = |role| {
        LinkConfig::new(role)
            .with_retry_budget(20)
            .with_ack_timeout(Duration::from_millis(30))
    };
    let payloads: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; 1 + i as usize * 7]).collect();
    let receiver = spawn_receiver(rx_line, lossy(Role::Receiver), payloads.len());

    let mut tx = Session::open(tx_line, lossy(Role::Transmitter)).unwrap();
    for payload in &payloads {
        tx.write(payload).unwrap();
    }
    // Teardown replies may be lost too; anything but a timeout is a failure.
    let closed = tx.close(true);
    assert!(closed.as_ref().map_or_else(LinkError::is_timeout, |_| true), "close failed: {closed:?}");
    assert_eq!(tx.state(), SessionState::Closed);

    let rx = receiver.join().unwrap();
    assert_eq!(rx.payloads, payloads);
    assert!(rx.close.as_ref().map_or_else(LinkError::is_timeout, |_| true));
    assert!(tx.statistics().retransmissions > 0);

    println!(
        "✓ Lossy line: {} payloads delivered in order ({} retransmissions, {} duplicates)",
        payloads.len(),
        tx.statistics().retransmissions,
        rx.stats.duplicates
    );
}
