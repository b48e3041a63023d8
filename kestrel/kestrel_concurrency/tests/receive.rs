use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded};
use kestrel_concurrency::{ActorSystem, Context, SpawnOptions};
use kestrel_core::{ActorError, ExitReason, MailboxConfig, OverflowPolicy};

const TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
enum Msg {
    Job(u32),
    Priority(u32),
}

#[test]
fn test_priority_message_is_picked_first() {
    let system = ActorSystem::new();
    let (go_tx, go_rx) = bounded::<()>(1);
    let (out_tx, out_rx) = unbounded();

    let actor = system
        .spawn(move |ctx: &mut Context<Msg>| {
            let _ = go_rx.recv();
            let first = ctx
                .receive()
                .on(|m| matches!(m, Msg::Priority(_)), |m| m)
                .run()?;
            let _ = out_tx.send(first);
            for _ in 0..2 {
                let next = ctx.receive().on(|_| true, |m| m).run()?;
                let _ = out_tx.send(next);
            }
            Ok(())
        })
        .unwrap();

    actor.send(Msg::Job(1)).unwrap();
    actor.send(Msg::Job(2)).unwrap();
    actor.send(Msg::Priority(9)).unwrap();
    go_tx.send(()).unwrap();

    let received: Vec<Msg> = (0..3).map(|_| out_rx.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(received, vec![Msg::Priority(9), Msg::Job(1), Msg::Job(2)]);
    assert!(matches!(actor.join(TIMEOUT), Some(ExitReason::Normal)));
}

#[test]
fn test_concurrent_senders_keep_their_own_order() {
    const SENDERS: usize = 4;
    const PER_SENDER: u32 = 500;

    let system = ActorSystem::new();
    let (out_tx, out_rx) = bounded(1);

    let actor = system
        .spawn(move |ctx: &mut Context<(usize, u32)>| {
            let mut seen = Vec::new();
            for _ in 0..SENDERS * PER_SENDER as usize {
                seen.push(ctx.receive().on(|_| true, |m| m).run()?);
            }
            let _ = out_tx.send(seen);
            Ok(())
        })
        .unwrap();

    let senders: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let actor = actor.clone();
            thread::spawn(move || {
                for seq in 0..PER_SENDER {
                    actor.send((sender, seq)).unwrap();
                }
            })
        })
        .collect();
    for handle in senders {
        handle.join().unwrap();
    }

    let seen = out_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(seen.len(), SENDERS * PER_SENDER as usize);
    let mut next = [0u32; SENDERS];
    for (sender, seq) in seen {
        assert_eq!(seq, next[sender], "sender {} out of order", sender);
        next[sender] += 1;
    }
    assert!(next.iter().all(|&n| n == PER_SENDER));
}

#[test]
fn test_receive_waits_for_late_match() {
    let system = ActorSystem::new();
    let (out_tx, out_rx) = bounded(1);

    let actor = system
        .spawn(move |ctx: &mut Context<Msg>| {
            let value = ctx
                .receive()
                .on(|m| matches!(m, Msg::Priority(_)), |m| Some(m))
                .after(TIMEOUT, || None)
                .run()?;
            let _ = out_tx.send((value, ctx.myself().mailbox_len()));
            Ok(())
        })
        .unwrap();

    actor.send(Msg::Job(1)).unwrap();
    thread::sleep(Duration::from_millis(30));
    actor.send(Msg::Priority(2)).unwrap();

    let (value, left) = out_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(value, Some(Msg::Priority(2)));
    assert_eq!(left, 1);
}

#[test]
fn test_timeout_keeps_unmatched_messages() {
    let system = ActorSystem::new();
    let (go_tx, go_rx) = bounded::<()>(1);
    let (out_tx, out_rx) = bounded(2);

    let actor = system
        .spawn(move |ctx: &mut Context<Msg>| {
            let _ = go_rx.recv();
            let first = ctx
                .receive()
                .on(|m| matches!(m, Msg::Priority(_)), |_| "matched")
                .after(Duration::from_millis(20), || "timeout")
                .run()?;
            let _ = out_tx.send(format!("{}", first));
            let leftover = ctx.recv_timeout(Duration::ZERO)?;
            let _ = out_tx.send(format!("{:?}", leftover.and_then(|s| s.into_message())));
            Ok(())
        })
        .unwrap();

    actor.send(Msg::Job(7)).unwrap();
    go_tx.send(()).unwrap();
    assert_eq!(out_rx.recv_timeout(TIMEOUT).unwrap(), "timeout");
    assert_eq!(out_rx.recv_timeout(TIMEOUT).unwrap(), "Some(Job(7))");
}

#[test]
fn test_transform_before_matching() {
    let system = ActorSystem::new();
    let (out_tx, out_rx) = bounded(1);

    let actor = system
        .spawn(move |ctx: &mut Context<Msg>| {
            let _ = ctx.recv()?;
            let promoted = ctx
                .receive()
                .transform(|m| match m {
                    Msg::Job(n) if *n >= 100 => Msg::Priority(*n),
                    other => other.clone(),
                })
                .on(|m| matches!(m, Msg::Priority(_)), |m| m)
                .run()?;
            let _ = out_tx.send(promoted);
            Ok(())
        })
        .unwrap();

    actor.send(Msg::Job(0)).unwrap();
    actor.send(Msg::Job(5)).unwrap();
    actor.send(Msg::Job(150)).unwrap();
    assert_eq!(out_rx.recv_timeout(TIMEOUT).unwrap(), Msg::Priority(150));
}

#[test]
fn test_throw_overflow_raised_in_receiver() {
    let system = ActorSystem::new();
    let (go_tx, go_rx) = bounded::<()>(1);

    let actor = system
        .spawn_with(
            SpawnOptions::new().mailbox(MailboxConfig::bounded(1, OverflowPolicy::Throw)),
            move |ctx: &mut Context<Msg>| {
                let _ = go_rx.recv();
                ctx.recv().map(|_| ())
            },
        )
        .unwrap();

    actor.send(Msg::Job(1)).unwrap();
    // Accepted by the sender; the receiver fails instead.
    actor.send(Msg::Job(2)).unwrap();
    go_tx.send(()).unwrap();

    match actor.join(TIMEOUT) {
        Some(ExitReason::Error(err)) => assert!(matches!(
            err.as_ref(),
            ActorError::MailboxOverflow {
                capacity: 1,
                sender: None
            }
        )),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_drop_overflow_discards_silently() {
    let system = ActorSystem::new();
    let (go_tx, go_rx) = bounded::<()>(1);
    let (out_tx, out_rx) = bounded(1);

    let actor = system
        .spawn_with(
            SpawnOptions::new().mailbox(MailboxConfig::bounded(2, OverflowPolicy::Drop)),
            move |ctx: &mut Context<Msg>| {
                let _ = go_rx.recv();
                let mut seen = Vec::new();
                while let Some(signal) = ctx.recv_timeout(Duration::ZERO)? {
                    seen.extend(signal.into_message());
                }
                let _ = out_tx.send(seen);
                Ok(())
            },
        )
        .unwrap();

    for n in 0..5 {
        actor.send(Msg::Job(n)).unwrap();
    }
    go_tx.send(()).unwrap();
    assert_eq!(
        out_rx.recv_timeout(TIMEOUT).unwrap(),
        vec![Msg::Job(0), Msg::Job(1)]
    );
}

#[test]
fn test_block_overflow_waits_for_space() {
    let system = ActorSystem::new();
    let (go_tx, go_rx) = bounded::<()>(1);

    let actor = system
        .spawn_with(
            SpawnOptions::new().mailbox(MailboxConfig::bounded(1, OverflowPolicy::Block)),
            move |ctx: &mut Context<Msg>| {
                let _ = go_rx.recv();
                ctx.recv()?;
                ctx.recv()?;
                Ok(())
            },
        )
        .unwrap();

    actor.send(Msg::Job(1)).unwrap();
    let (sent_tx, sent_rx) = bounded(1);
    let sender = actor.clone();
    let handle = thread::spawn(move || {
        let result = sender.send(Msg::Job(2));
        let _ = sent_tx.send(result.is_ok());
    });

    assert!(sent_rx.recv_timeout(Duration::from_millis(50)).is_err());
    go_tx.send(()).unwrap();
    assert_eq!(sent_rx.recv_timeout(TIMEOUT), Ok(true));
    handle.join().unwrap();
    assert!(matches!(actor.join(TIMEOUT), Some(ExitReason::Normal)));
}

#[test]
fn test_state_cell() {
    let system = ActorSystem::new();
    let (out_tx, out_rx) = bounded(1);

    system
        .spawn(move |ctx: &mut Context<u32>| {
            ctx.set_state(0u32);
            for _ in 0..3 {
                let n = ctx.receive().on(|_| true, |n| n).run()?;
                if let Some(total) = ctx.state_mut::<u32>() {
                    *total += n;
                }
            }
            assert!(ctx.state::<String>().is_none());
            let _ = out_tx.send(ctx.take_state::<u32>());
            Ok(())
        })
        .map(|actor| {
            for n in [1, 2, 3] {
                actor.send(n).unwrap();
            }
        })
        .unwrap();

    assert_eq!(out_rx.recv_timeout(TIMEOUT).unwrap(), Some(6));
}
