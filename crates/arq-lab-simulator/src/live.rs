//! Sender and receiver as two independent tokio tasks.
//!
//! The endpoints share nothing but the two lossy links. Each link samples
//! loss on entry and then holds every surviving item for the transmission
//! delay, first in first out. Times are milliseconds since the run began.

use arq_lab_abstract::{Acknowledgment, Delivery, Frame, LinkConfig};
use arq_lab_protocol::{Receiver, Sender, SenderStats};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::channel::{Channel, FaultPlan, Transmit};
use crate::error::SimError;

#[derive(Debug, Clone)]
pub struct LiveReport {
    pub delivered: Vec<u64>,
    pub sender: SenderStats,
    pub out_of_order_discards: u64,
    pub elapsed: Duration,
}

impl LiveReport {
    pub fn delivered_in_order(&self, total_frames: u64) -> bool {
        self.delivered.len() as u64 == total_frames
            && self
                .delivered
                .iter()
                .enumerate()
                .all(|(i, index)| i as u64 == *index)
    }
}

/// Entry side of one direction of the link.
struct LinkSender<T> {
    channel: Channel<StdRng>,
    delay: Duration,
    tx: UnboundedSender<(Instant, T)>,
}

impl<T: Transmit> LinkSender<T> {
    /// Returns whether the item survived the channel.
    fn send(&mut self, item: T) -> Result<bool, SimError> {
        let Some(item) = self.channel.transmit(item).into_item() else {
            return Ok(false);
        };
        self.tx
            .send((Instant::now() + self.delay, item))
            .map_err(|_| SimError::LinkClosed)?;
        Ok(true)
    }
}

fn lossy_link<T: Transmit + Send + 'static>(
    channel: Channel<StdRng>,
) -> (LinkSender<T>, UnboundedReceiver<T>) {
    let delay = Duration::from_millis(channel.transmission_delay());
    let (tx, mut in_flight) = mpsc::unbounded_channel::<(Instant, T)>();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some((due, item)) = in_flight.recv().await {
            sleep_until(due).await;
            if out_tx.send(item).is_err() {
                break;
            }
        }
    });

    (LinkSender { channel, delay, tx }, out_rx)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

async fn sender_task(
    config: LinkConfig,
    mut link: LinkSender<Frame>,
    mut acks: UnboundedReceiver<Acknowledgment>,
    start: Instant,
) -> Result<SenderStats, SimError> {
    let mut sender = Sender::new(&config);

    while !sender.is_done() {
        let now = elapsed_ms(start);
        while sender.has_sendable() {
            let frame = sender.send_next(now)?;
            let index = frame.payload_index;
            if !link.send(frame)? {
                debug!("frame {} lost in transit", index);
            }
        }

        let deadline = sender
            .timer()
            .deadline()
            .unwrap_or(now + sender.timer().timeout());
        tokio::select! {
            ack = acks.recv() => match ack {
                Some(ack) => {
                    sender.on_acknowledgment(ack, elapsed_ms(start));
                }
                None => return Err(SimError::LinkClosed),
            },
            _ = sleep_until(start + Duration::from_millis(deadline)) => {
                let now = elapsed_ms(start);
                if sender.timer().has_expired(now) {
                    sender.on_timeout(now);
                }
            }
        }
    }

    Ok(sender.stats().clone())
}

/// Runs until the frame link closes, which happens once the sender has
/// finished and the last in-flight frame has drained.
async fn receiver_task(
    config: LinkConfig,
    mut frames: UnboundedReceiver<Frame>,
    mut link: LinkSender<Acknowledgment>,
) -> (Vec<Delivery>, u64) {
    let mut receiver = Receiver::new(&config);
    let mut deliveries: Vec<Delivery> = Vec::new();

    while let Some(frame) = frames.recv().await {
        let ack = receiver.on_frame(&frame, &mut deliveries);
        match link.send(ack) {
            Ok(true) => {}
            Ok(false) => debug!("ack {} lost in transit", ack.ack_num),
            // sender already finished; stray acks have nowhere to go
            Err(_) => debug!("ack {} after sender shutdown", ack.ack_num),
        }
    }

    (deliveries, receiver.out_of_order_discards())
}

pub async fn run(config: LinkConfig) -> Result<LiveReport, SimError> {
    run_with_faults(config, FaultPlan::default()).await
}

pub async fn run_with_faults(config: LinkConfig, faults: FaultPlan) -> Result<LiveReport, SimError> {
    config.validate()?;
    if !config.timeout_covers_round_trip() {
        warn!(
            "timeout {} ms does not exceed the round trip of {} ms; expect spurious retransmissions",
            config.timeout,
            2 * config.transmission_delay
        );
    }
    info!(
        "Starting live transfer: {} frames, window {}, delay {} ms",
        config.total_frames, config.window_size, config.transmission_delay
    );

    let forward = Channel::new(&config, StdRng::seed_from_u64(config.seed)).with_faults(faults.clone());
    let reverse = Channel::new(&config, StdRng::seed_from_u64(config.seed.wrapping_add(1)))
        .with_faults(faults);
    let (frame_link, frame_rx) = lossy_link::<Frame>(forward);
    let (ack_link, ack_rx) = lossy_link::<Acknowledgment>(reverse);

    let start = Instant::now();
    let receiver = tokio::spawn(receiver_task(config.clone(), frame_rx, ack_link));
    let sender = tokio::spawn(sender_task(config.clone(), frame_link, ack_rx, start));

    let stats = sender.await??;
    let (deliveries, out_of_order_discards) = receiver.await?;
    let elapsed = start.elapsed();
    info!(
        "Live transfer complete in {:?} ({} retransmissions, {} timeouts)",
        elapsed, stats.retransmissions, stats.timeouts
    );

    Ok(LiveReport {
        delivered: deliveries.into_iter().map(|d| d.payload_index).collect(),
        sender: stats,
        out_of_order_discards,
        elapsed,
    })
}
