use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::game::{ClientId, GameDefinition};
use crate::protocol::{ClientMessage, Outgoing};
use crate::server::Server;

/// Control-plane requests for a running driver.
pub enum DriverCommand<G: GameDefinition> {
    AddClient(ClientId),
    RemoveClient(ClientId),
    SetWorld(G::World),
    Stop,
}

/// Handle to a spawned server task.
pub struct DriverHandle<G: GameDefinition> {
    commands: mpsc::UnboundedSender<DriverCommand<G>>,
    task: JoinHandle<Server<G>>,
}

impl<G: GameDefinition> DriverHandle<G> {
    pub fn command(&self, command: DriverCommand<G>) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Cancel the tick scheduler and recover the server. Pending outbound
    /// traffic is discarded; no further clients are accepted.
    pub async fn stop(self) -> Server<G> {
        let _ = self.commands.send(DriverCommand::Stop);
        self.task.await.expect("server task panicked")
    }
}

/// Run the server on a fixed-interval scheduler.
///
/// One task owns the server, so a tick can never overlap with itself.
/// Network receive loops deposit decoded messages into `inbound`; the task
/// drains them between ticks (message arrival never advances the
/// simulation). Everything the server emits goes out through `outbound`
/// for the transport layer to ferry.
pub fn spawn<G: GameDefinition>(
    mut server: Server<G>,
    mut inbound: mpsc::UnboundedReceiver<(ClientId, ClientMessage<G::Input, G::Action>)>,
    outbound: mpsc::UnboundedSender<Outgoing<G::World, G::ActionResult>>,
) -> DriverHandle<G> {
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut interval =
            time::interval(Duration::from_secs_f64(server.config().tick_interval_ms() / 1000.0));
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !server.is_running() {
                        break;
                    }
                    server.tick();
                }
                message = inbound.recv(), if inbound_open => {
                    match message {
                        Some((from, message)) => server.handle_message(from, message),
                        // Transport went away; keep ticking for local
                        // observers until an explicit stop.
                        None => inbound_open = false,
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(DriverCommand::AddClient(id)) => server.add_client(id),
                        Some(DriverCommand::RemoveClient(id)) => server.remove_client(id),
                        Some(DriverCommand::SetWorld(world)) => server.set_world(world),
                        Some(DriverCommand::Stop) | None => {
                            server.stop();
                            break;
                        }
                    }
                }
            }

            for outgoing in server.drain_outbox() {
                // A closed outbound side means nobody is listening; the
                // traffic is unroutable and dropped.
                let _ = outbound.send(outgoing);
            }
        }

        server
    });

    DriverHandle {
        commands: command_tx,
        task,
    }
}
