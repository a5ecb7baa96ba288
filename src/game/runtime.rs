//! Arena task and its command channel
//!
//! One task owns [`ArenaState`] and handles commands to completion, one at a
//! time. Connections and timers only ever talk to it through [`ArenaHandle`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{
    period, unix_millis, BOT_TICK_HZ, REAP_INTERVAL, SHOT_SWEEP_INTERVAL, SNAPSHOT_HZ, STATE_TICK_HZ,
};
use crate::ws::outbound::Outbound;
use crate::ws::protocol::ClientMsg;

use super::arena::{ArenaState, HelloRejected};
use super::bots::BotController;
use super::PlayerId;

const COMMAND_BUFFER: usize = 1024;

/// Work for the arena task
pub enum ArenaCommand {
    Hello {
        name: String,
        outbound: Outbound,
        reply: oneshot::Sender<Result<PlayerId, HelloRejected>>,
    },
    Client {
        id: PlayerId,
        msg: ClientMsg,
    },
    Disconnect {
        id: PlayerId,
    },
    StateTick,
    SnapshotTick,
    BotTick,
    Reap,
    SweepShots,
}

/// Counters published after every command, read by the health endpoint
#[derive(Debug, Default)]
pub struct ArenaStats {
    connections: AtomicUsize,
    players: AtomicUsize,
    bots: AtomicUsize,
    latest_seq: AtomicU64,
    events_in_memory: AtomicUsize,
}

impl ArenaStats {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn players(&self) -> usize {
        self.players.load(Ordering::Relaxed)
    }

    pub fn bots(&self) -> usize {
        self.bots.load(Ordering::Relaxed)
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq.load(Ordering::Relaxed)
    }

    pub fn events_in_memory(&self) -> usize {
        self.events_in_memory.load(Ordering::Relaxed)
    }
}

/// Handle to the running arena
#[derive(Clone)]
pub struct ArenaHandle {
    tx: mpsc::Sender<ArenaCommand>,
    stats: Arc<ArenaStats>,
    broadcasting: Arc<AtomicBool>,
}

impl ArenaHandle {
    /// Join with `name`; the welcome frames arrive through `outbound`
    pub async fn hello(&self, name: String, outbound: Outbound) -> Result<PlayerId, HelloRejected> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ArenaCommand::Hello {
                name,
                outbound,
                reply,
            })
            .await
            .map_err(|_| HelloRejected::Unavailable)?;
        rx.await.map_err(|_| HelloRejected::Unavailable)?
    }

    /// Forward a client message; false once the arena is gone
    pub async fn send(&self, id: PlayerId, msg: ClientMsg) -> bool {
        self.tx.send(ArenaCommand::Client { id, msg }).await.is_ok()
    }

    pub async fn disconnect(&self, id: PlayerId) {
        let _ = self.tx.send(ArenaCommand::Disconnect { id }).await;
    }

    /// Start the state and snapshot broadcast loops, once per process
    pub fn start_broadcasting(&self) {
        if self.broadcasting.swap(true, Ordering::AcqRel) {
            return;
        }
        spawn_ticker(&self.tx, period(STATE_TICK_HZ), || ArenaCommand::StateTick);
        spawn_ticker(&self.tx, period(SNAPSHOT_HZ), || ArenaCommand::SnapshotTick);
        info!(
            state_hz = STATE_TICK_HZ,
            snapshot_hz = SNAPSHOT_HZ,
            "Broadcast loops started"
        );
    }

    pub fn stats(&self) -> &ArenaStats {
        &self.stats
    }
}

/// Arena task
pub struct GameArena {
    state: ArenaState,
    bots: BotController,
    rx: mpsc::Receiver<ArenaCommand>,
    stats: Arc<ArenaStats>,
}

impl GameArena {
    pub fn new(state: ArenaState, bots: BotController) -> (Self, ArenaHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let stats = Arc::new(ArenaStats::default());

        let handle = ArenaHandle {
            tx,
            stats: stats.clone(),
            broadcasting: Arc::new(AtomicBool::new(false)),
        };

        let arena = Self {
            state,
            bots,
            rx,
            stats,
        };
        arena.publish_stats();

        (arena, handle)
    }

    /// Seed the bots, start the background timers and run the arena task
    pub fn spawn(mut state: ArenaState, bot_count: usize) -> ArenaHandle {
        let mut bots = BotController::new();
        bots.init(&mut state, bot_count, unix_millis());
        let has_bots = !bots.is_empty();

        let (arena, handle) = Self::new(state, bots);

        if has_bots {
            spawn_ticker(&handle.tx, period(BOT_TICK_HZ), || ArenaCommand::BotTick);
        }
        spawn_ticker(&handle.tx, REAP_INTERVAL, || ArenaCommand::Reap);
        spawn_ticker(&handle.tx, SHOT_SWEEP_INTERVAL, || ArenaCommand::SweepShots);

        tokio::spawn(arena.run());
        handle
    }

    pub async fn run(mut self) {
        info!(
            world = %self.state.settings.world,
            seed = self.state.settings.seed,
            bots = self.bots.len(),
            "Arena started"
        );

        while let Some(command) = self.rx.recv().await {
            self.handle(command, unix_millis());
            self.publish_stats();
        }

        info!("Arena stopped");
    }

    fn handle(&mut self, command: ArenaCommand, now: u64) {
        match command {
            ArenaCommand::Hello {
                name,
                outbound,
                reply,
            } => {
                let result = self.state.join(&name, outbound, now);
                let _ = reply.send(result);
            }
            ArenaCommand::Client { id, msg } => self.state.handle_client(&id, msg, now),
            ArenaCommand::Disconnect { id } => self.state.disconnect(&id, now),
            ArenaCommand::StateTick => self.state.state_tick(now),
            ArenaCommand::SnapshotTick => self.state.snapshot_tick(),
            ArenaCommand::BotTick => self.bots.tick(&mut self.state, now),
            ArenaCommand::Reap => {
                let bots = &self.bots;
                let reaped = self.state.reap_idle(now, |id| bots.contains(id));
                if !reaped.is_empty() {
                    debug!(count = reaped.len(), "Idle entries reaped");
                }
            }
            ArenaCommand::SweepShots => self.state.sweep_shots(now),
        }
    }

    fn publish_stats(&self) {
        let stats = &self.stats;
        stats
            .connections
            .store(self.state.sessions.len(), Ordering::Relaxed);
        stats.players.store(self.state.world.len(), Ordering::Relaxed);
        stats.bots.store(self.bots.len(), Ordering::Relaxed);
        stats
            .latest_seq
            .store(self.state.latest_seq(), Ordering::Relaxed);
        stats
            .events_in_memory
            .store(self.state.log.len(), Ordering::Relaxed);
    }
}

/// Feed `command` into the arena every `every` until the arena is gone.
/// Holds only a weak sender so tickers never keep the arena alive.
fn spawn_ticker(tx: &mpsc::Sender<ArenaCommand>, every: Duration, command: fn() -> ArenaCommand) {
    let weak = tx.downgrade();
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(tx) = weak.upgrade() else {
                break;
            };
            // a busy arena just misses this tick
            if let Err(TrySendError::Closed(_)) = tx.try_send(command()) {
                break;
            }
        }
    });
}
