use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use kestrel_concurrency::behaviour::gen_server::{self, Info};
use kestrel_concurrency::{ActorSystem, GenServer, ReplyTo, ServerContext, SpawnOptions};
use kestrel_core::{ActorError, CallError, ExitReason};

const TIMEOUT: Duration = Duration::from_secs(2);

enum Call {
    Get,
    Add(i64),
    Fail,
    Panic,
    Slow(Duration),
    Defer,
}

enum Cast {
    Inc,
    Release,
}

struct Counter {
    value: i64,
    fail_init: bool,
    tick_every: Option<Duration>,
    pending: Vec<ReplyTo<i64>>,
    events: Sender<String>,
}

impl Counter {
    fn new(events: Sender<String>) -> Self {
        Self {
            value: 0,
            fail_init: false,
            tick_every: None,
            pending: Vec::new(),
            events,
        }
    }
}

impl GenServer for Counter {
    type Call = Call;
    type Cast = Cast;
    type Info = i64;
    type Reply = i64;

    fn init(&mut self, ctx: &mut ServerContext<'_, Self>) -> Result<(), ActorError> {
        if self.fail_init {
            return Err(ActorError::failed("refusing to start"));
        }
        ctx.set_timeout(self.tick_every);
        Ok(())
    }

    fn handle_call(
        &mut self,
        request: Call,
        reply: ReplyTo<i64>,
        _ctx: &mut ServerContext<'_, Self>,
    ) -> Result<(), ActorError> {
        match request {
            Call::Get => {
                reply.reply(self.value);
            }
            Call::Add(n) => {
                self.value += n;
                reply.reply(self.value);
            }
            Call::Fail => return Err(ActorError::failed("bad request")),
            Call::Panic => panic!("handler blew up"),
            Call::Slow(delay) => {
                std::thread::sleep(delay);
                reply.reply(self.value);
            }
            Call::Defer => self.pending.push(reply),
        }
        Ok(())
    }

    fn handle_cast(&mut self, message: Cast, _ctx: &mut ServerContext<'_, Self>) -> Result<(), ActorError> {
        match message {
            Cast::Inc => self.value += 1,
            Cast::Release => {
                for reply in self.pending.drain(..) {
                    reply.reply(self.value);
                }
            }
        }
        Ok(())
    }

    fn handle_info(&mut self, info: Info<i64>, _ctx: &mut ServerContext<'_, Self>) -> Result<(), ActorError> {
        if let Info::Message(n) = info {
            self.value *= n;
        }
        Ok(())
    }

    fn handle_timeout(&mut self, ctx: &mut ServerContext<'_, Self>) -> Result<(), ActorError> {
        self.value += 1;
        let _ = self.events.send(format!("tick {}", self.value));
        if self.value == 3 {
            ctx.set_timeout(None);
        }
        Ok(())
    }

    fn terminate(&mut self, reason: &ExitReason) {
        let _ = self.events.send(format!("terminate {}", reason));
    }
}

fn counter() -> (Counter, Receiver<String>) {
    let (tx, rx) = unbounded();
    (Counter::new(tx), rx)
}

#[test]
fn test_call_cast_info_in_order() {
    let system = ActorSystem::new();
    let (server, _events) = counter();
    let server = gen_server::start(&system, server).unwrap();

    server.cast(Cast::Inc).unwrap();
    server.cast(Cast::Inc).unwrap();
    server.info(10).unwrap();
    assert_eq!(server.call(Call::Add(5)).unwrap(), 25);
    assert_eq!(server.call(Call::Get).unwrap(), 25);
}

#[test]
fn test_call_timeout_leaves_server_running() {
    let system = ActorSystem::new();
    let (server, _events) = counter();
    let server = gen_server::start(&system, server).unwrap();

    let result = server.call_timeout(Call::Slow(Duration::from_millis(100)), Duration::from_millis(10));
    assert!(matches!(result, Err(CallError::Timeout(_))));
    assert_eq!(server.call(Call::Add(1)).unwrap(), 1);
}

#[test]
fn test_handler_error_reaches_caller_and_stops_server() {
    let system = ActorSystem::new();
    let (server, events) = counter();
    let server = gen_server::start(&system, server).unwrap();

    match server.call(Call::Fail) {
        Err(CallError::Failed(err)) => {
            assert!(matches!(err.as_ref(), ActorError::Failed(m) if m == "bad request"))
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert!(matches!(server.join(TIMEOUT), Some(ExitReason::Error(_))));
    assert_eq!(events.recv_timeout(TIMEOUT).unwrap(), "terminate error: bad request");
    assert!(matches!(server.call(Call::Get), Err(CallError::ServerDown)));
}

#[test]
fn test_handler_panic_reported_as_failure() {
    let system = ActorSystem::new();
    let (server, _events) = counter();
    let server = gen_server::start(&system, server).unwrap();

    match server.call(Call::Panic) {
        Err(CallError::Failed(err)) => {
            assert!(matches!(err.as_ref(), ActorError::Panicked(m) if m.contains("blew up")))
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert!(server.join(TIMEOUT).is_some());
}

#[test]
fn test_shutdown_runs_terminate_once() {
    let system = ActorSystem::new();
    let (server, events) = counter();
    let server = gen_server::start(&system, server).unwrap();

    server.cast(Cast::Inc).unwrap();
    server.shutdown().unwrap();
    assert!(matches!(server.join(TIMEOUT), Some(ExitReason::Shutdown)));
    assert_eq!(events.recv_timeout(TIMEOUT).unwrap(), "terminate shutdown");
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(!server.is_alive());
}

#[test]
fn test_kill_still_runs_terminate() {
    let system = ActorSystem::new();
    let (server, events) = counter();
    let server = gen_server::start(&system, server).unwrap();

    server.kill();
    assert!(matches!(server.join(TIMEOUT), Some(ExitReason::Killed)));
    assert_eq!(events.recv_timeout(TIMEOUT).unwrap(), "terminate killed");
}

#[test]
fn test_idle_timeout_ticks() {
    let system = ActorSystem::new();
    let (mut server, events) = counter();
    server.tick_every = Some(Duration::from_millis(10));
    let server = gen_server::start(&system, server).unwrap();

    let ticks: Vec<String> = (0..3).map(|_| events.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(ticks, vec!["tick 1", "tick 2", "tick 3"]);
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(server.call(Call::Get).unwrap(), 3);
}

#[test]
fn test_deferred_reply() {
    let system = ActorSystem::new();
    let (server, _events) = counter();
    let server = gen_server::start(&system, server).unwrap();

    let caller = server.clone();
    let handle = std::thread::spawn(move || caller.call(Call::Defer));
    // The server keeps serving while the first call waits.
    assert_eq!(server.call(Call::Add(7)).unwrap(), 7);
    server.cast(Cast::Release).unwrap();
    assert_eq!(handle.join().unwrap().unwrap(), 7);
}

#[test]
fn test_init_failure_returned_to_starter() {
    let system = ActorSystem::new();
    let (mut server, events) = counter();
    server.fail_init = true;

    let result = gen_server::start(&system, server);
    assert!(matches!(result, Err(ActorError::Failed(ref m)) if m == "refusing to start"));
    // terminate only runs for servers that started.
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_named_server() {
    let system = ActorSystem::new();
    let (server, _events) = counter();
    let server =
        gen_server::start_with(&system, server, SpawnOptions::new().name("counter")).unwrap();

    let found = system.whereis_any("counter").expect("registered");
    assert_eq!(found.id(), server.id());

    server.shutdown().unwrap();
    server.join(TIMEOUT).unwrap();
    assert!(system.whereis_any("counter").is_none());
}
