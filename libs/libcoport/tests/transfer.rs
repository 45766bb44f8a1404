//! End-to-end transfer tests
//!
//! Exercise every port kind through the public engine API, including the
//! capacity and close edge cases and concurrent producers.

mod common;

use libcoport::{CoportError, Events, PortKind, PortStatus};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

#[test]
fn test_ring_fills_then_drains_in_order() {
    let engine = common::engine_with_ring(4);
    let ring = engine.open(PortKind::RingOfHandles).unwrap();

    let messages: Vec<[u8; 8]> = (0u8..5).map(|i| [i; 8]).collect();
    for message in &messages[..4] {
        assert_eq!(engine.send(&ring, message).unwrap(), 8);
    }
    assert_eq!(engine.send(&ring, &messages[4]), Err(CoportError::WouldBlock));

    let info = engine.info(&ring).unwrap();
    assert_eq!(info.length, 4);
    assert!(info.events.contains(Events::WRITE_ERROR));
    assert!(!info.events.contains(Events::WRITABLE));

    let mut buf = [0u8; 8];
    assert_eq!(engine.receive(&ring, &mut buf).unwrap(), 8);
    assert_eq!(buf, messages[0]);
    assert_eq!(engine.send(&ring, &messages[4]).unwrap(), 8);

    for expected in &messages[1..] {
        assert_eq!(engine.receive(&ring, &mut buf).unwrap(), 8);
        assert_eq!(&buf, expected);
    }
    assert_eq!(engine.receive(&ring, &mut buf).unwrap(), 0);
    assert!(engine.info(&ring).unwrap().events.contains(Events::READ_ERROR));
}

#[test]
fn test_ring_message_outlives_sender_buffer() {
    let engine = common::engine();
    let ring = engine.open(PortKind::RingOfHandles).unwrap();

    let mut payload = b"first".to_vec();
    engine.send(&ring, &payload).unwrap();
    payload.copy_from_slice(b"later");

    let message = engine.receive_message(&ring).unwrap().unwrap();
    assert_eq!(message.as_bytes(), b"first");
}

#[test]
fn test_ring_receive_rejects_short_buffer() {
    let engine = common::engine();
    let ring = engine.open(PortKind::RingOfHandles).unwrap();
    engine.send(&ring, b"twelve bytes").unwrap();

    let mut small = [0u8; 4];
    assert!(matches!(
        engine.receive(&ring, &mut small),
        Err(CoportError::InvalidArgument(_))
    ));

    let mut buf = [0u8; 12];
    assert_eq!(engine.receive(&ring, &mut buf).unwrap(), 12);
    assert_eq!(&buf, b"twelve bytes");
}

#[test]
fn test_receive_message_needs_ring() {
    let engine = common::engine();
    let stream = engine.open(PortKind::ByteStream).unwrap();
    assert!(engine.receive_message(&stream).is_err());
}

#[test]
fn test_rendezvous_single_slot() {
    let engine = common::engine();
    let port = engine.open(PortKind::Rendezvous).unwrap();

    assert_eq!(engine.send(&port, b"one").unwrap(), 3);
    assert_eq!(engine.send(&port, b"two"), Err(CoportError::WouldBlock));

    let mut buf = [0u8; 16];
    assert_eq!(engine.receive(&port, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"one");
    assert_eq!(engine.receive(&port, &mut buf).unwrap(), 0);

    assert_eq!(engine.send(&port, b"two").unwrap(), 3);
}

#[test]
fn test_stream_partial_transfers() {
    let mut config = libcoport::CoportConfig::default();
    config.transfer.stream_buffer_bytes = 8;
    let engine = libcoport::CoportEngine::new(config).unwrap();
    let stream = engine.open(PortKind::ByteStream).unwrap();

    assert_eq!(engine.send(&stream, b"0123456789").unwrap(), 8);
    assert_eq!(engine.send(&stream, b"x"), Err(CoportError::WouldBlock));

    let mut buf = [0u8; 3];
    assert_eq!(engine.receive(&stream, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"012");
    assert_eq!(engine.send(&stream, b"89ab").unwrap(), 3);

    let mut rest = [0u8; 16];
    assert_eq!(engine.receive(&stream, &mut rest).unwrap(), 8);
    assert_eq!(&rest[..8], b"3456789a");
}

#[test]
fn test_close_twice_fails() {
    let engine = common::engine();
    for kind in PortKind::ALL {
        let port = engine.open(kind).unwrap();
        engine.close(&port).unwrap();
        assert_eq!(engine.close(&port), Err(CoportError::PipeClosed));

        let mut buf = [0u8; 4];
        assert_eq!(engine.receive(&port, &mut buf), Err(CoportError::PipeClosed));
        assert_eq!(engine.info(&port).unwrap().status, PortStatus::Closed);
    }
}

#[test]
fn test_close_discards_queued_messages() {
    let engine = common::engine();
    let ring = engine.open(PortKind::RingOfHandles).unwrap();
    engine.send(&ring, b"a").unwrap();
    engine.send(&ring, b"b").unwrap();
    engine.close(&ring).unwrap();

    let info = engine.info(&ring).unwrap();
    assert_eq!(info.length, 0);
    assert_eq!(info.events, Events::CLOSED);
}

#[test]
fn test_table_exhaustion_is_permanent() {
    let engine = common::engine();
    let capacity = engine.config().table.rendezvous_ports;

    let ports: Vec<_> = (0..capacity)
        .map(|_| engine.open(PortKind::Rendezvous).unwrap())
        .collect();
    assert_eq!(
        engine.open(PortKind::Rendezvous),
        Err(CoportError::CapacityExceeded(PortKind::Rendezvous))
    );

    // Closing does not hand the slot back
    engine.close(&ports[0]).unwrap();
    assert!(engine.open(PortKind::Rendezvous).is_err());
    assert!(engine.open(PortKind::ByteStream).is_ok());
}

#[test]
fn test_concurrent_producers_keep_per_producer_order() {
    const PRODUCERS: u8 = 4;
    const PER_PRODUCER: u32 = 200;

    let engine = Arc::new(common::engine_with_ring(8));
    let ring = engine.open(PortKind::RingOfHandles).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let engine = Arc::clone(&engine);
            let ring = ring.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let mut message = vec![id];
                    message.extend_from_slice(&seq.to_le_bytes());
                    while engine.send(&ring, &message) == Err(CoportError::WouldBlock) {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut next = [0u32; PRODUCERS as usize];
    let mut received = 0;
    while received < PRODUCERS as u32 * PER_PRODUCER {
        match engine.receive_message(&ring).unwrap() {
            Some(message) => {
                let id = message[0] as usize;
                let seq = u32::from_le_bytes([message[1], message[2], message[3], message[4]]);
                assert_eq!(seq, next[id], "producer {} out of order", id);
                next[id] += 1;
                received += 1;
            }
            None => thread::yield_now(),
        }
    }

    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(engine.info(&ring).unwrap().length, 0);
}

#[test]
fn test_concurrent_stream_moves_every_byte() {
    const TOTAL: usize = 64 * 1024;

    let engine = Arc::new(common::engine());
    let stream = engine.open(PortKind::ByteStream).unwrap();

    let writer = {
        let engine = Arc::clone(&engine);
        let stream = stream.clone();
        thread::spawn(move || {
            let data: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
            let mut sent = 0;
            while sent < TOTAL {
                match engine.send(&stream, &data[sent..(sent + 1000).min(TOTAL)]) {
                    Ok(n) => sent += n,
                    Err(CoportError::WouldBlock) => thread::yield_now(),
                    Err(e) => panic!("send failed: {}", e),
                }
            }
        })
    };

    let mut got = Vec::with_capacity(TOTAL);
    let mut buf = [0u8; 777];
    while got.len() < TOTAL {
        let n = engine.receive(&stream, &mut buf).unwrap();
        got.extend_from_slice(&buf[..n]);
        let length = engine.info(&stream).unwrap().length;
        assert!(length <= engine.config().transfer.stream_buffer_bytes);
    }
    writer.join().unwrap();

    assert!(got.iter().enumerate().all(|(i, b)| *b == (i % 251) as u8));
}

#[test]
fn test_ring_length_matches_completed_transfers() {
    const THREADS: usize = 6;
    const ROUNDS: usize = 500;

    let engine = Arc::new(common::engine_with_ring(4));
    let ring = engine.open(PortKind::RingOfHandles).unwrap();

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let ring = ring.clone();
            thread::spawn(move || {
                let (mut sent, mut received) = (0usize, 0usize);
                for round in 0..ROUNDS {
                    if (t + round) % 2 == 0 {
                        match engine.send(&ring, b"tick") {
                            Ok(_) => sent += 1,
                            Err(e) => assert_eq!(e, CoportError::WouldBlock),
                        }
                    } else if engine.receive_message(&ring).unwrap().is_some() {
                        received += 1;
                    }
                }
                (sent, received)
            })
        })
        .collect();

    let (mut sent, mut received) = (0, 0);
    for worker in workers {
        let (s, r) = worker.join().unwrap();
        sent += s;
        received += r;
    }

    let info = engine.info(&ring).unwrap();
    assert_eq!(info.length, sent - received);
    assert!(info.length <= info.capacity);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ring_preserves_messages(
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..16)
    ) {
        let engine = common::engine_with_ring(16);
        let ring = engine.open(PortKind::RingOfHandles).unwrap();

        for message in &messages {
            prop_assert_eq!(engine.send(&ring, message).unwrap(), message.len());
        }
        for message in &messages {
            let received = engine.receive_message(&ring).unwrap().unwrap();
            prop_assert_eq!(received.as_bytes(), &message[..]);
        }
        prop_assert!(engine.receive_message(&ring).unwrap().is_none());
    }

    #[test]
    fn prop_rendezvous_round_trip(payload in prop::collection::vec(any::<u8>(), 1..4096)) {
        let engine = common::engine();
        let port = engine.open(PortKind::Rendezvous).unwrap();

        prop_assert_eq!(engine.send(&port, &payload).unwrap(), payload.len());
        let mut buf = vec![0u8; 4096];
        let n = engine.receive(&port, &mut buf).unwrap();
        prop_assert_eq!(&buf[..n], &payload[..]);
    }

    #[test]
    fn prop_stream_is_byte_exact(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)
    ) {
        let engine = common::engine();
        let stream = engine.open(PortKind::ByteStream).unwrap();

        let mut expected = Vec::new();
        for chunk in &chunks {
            prop_assert_eq!(engine.send(&stream, chunk).unwrap(), chunk.len());
            expected.extend_from_slice(chunk);
        }

        let mut got = vec![0u8; expected.len() + 1];
        let n = engine.receive(&stream, &mut got).unwrap();
        prop_assert_eq!(&got[..n], &expected[..]);
    }
}
