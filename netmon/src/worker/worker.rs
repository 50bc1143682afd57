//! One worker's capture/parse/track/write loop (spec.md §4.3 "Worker",
//! §5 Concurrency & resource model): a single thread owning its own capture
//! endpoint, writer and per-family connection tracker, polling at a 100ms
//! timeout and running an expiry sweep every 10 seconds of idle time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use netmon_events::base::{BaseEvent, DnsEvent, IcmpEvent, UdpEvent};
use netmon_events::error::FileError;
use netmon_events::writer::EventWriter;
use netmon_events::{Address, Event};

use crate::capture::{self, Source};
use crate::dns;
use crate::error::{CaptureError, PacketError};
use crate::parser::{Hooks, PacketCtx, TcpSegmentInfo};
use crate::stats::WorkerStats;
use crate::tcp::ConnectionTracker;

pub use netmon_events::error::FileError as WriterError;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const DNS_PORT: u16 = 53;

/// Implements the packet parser's [`Hooks`] trait, translating parsed L4
/// payloads into structured events and feeding the TCP tracker. Owns
/// nothing the worker doesn't hand it; one instance lives for the whole
/// worker lifetime.
struct WorkerHooks<'a> {
    writer: &'a mut EventWriter,
    ipv4: &'a mut ConnectionTracker,
    ipv6: &'a mut ConnectionTracker,
    stats: &'a mut WorkerStats,
    write_failed: bool,
}

impl<'a> WorkerHooks<'a> {
    fn tracker_for(&mut self, addr: &Address) -> &mut ConnectionTracker {
        if addr.is_v4() {
            self.ipv4
        } else {
            self.ipv6
        }
    }

    fn emit(&mut self, event: Event) {
        if self.write_failed {
            return;
        }
        if let Err(e) = self.writer.write(&event) {
            log::error!("event writer failed, stopping worker: {e}");
            self.write_failed = true;
        }
    }
}

impl<'a> Hooks for WorkerHooks<'a> {
    fn on_tcp(&mut self, ctx: PacketCtx, tcp: TcpSegmentInfo, packet_len: u16, payload: &[u8]) {
        let payload_len = payload.len();
        let mut emitted = Vec::new();
        self.tracker_for(&ctx.saddr)
            .on_segment(ctx, tcp, packet_len, payload_len, ctx.timestamp, |e| emitted.push(e));
        for event in emitted {
            self.emit(event);
        }
    }

    fn on_udp(&mut self, ctx: PacketCtx, sport: u16, dport: u16, packet_len: u16, payload: &[u8]) {
        if sport == DNS_PORT || dport == DNS_PORT {
            match dns::parse(payload) {
                Ok(msg) => {
                    self.emit(Event::Dns(DnsEvent {
                        base: BaseEvent {
                            timestamp: ctx.timestamp,
                            saddr: ctx.saddr,
                            daddr: ctx.daddr,
                        },
                        sport,
                        dport,
                        transferred: packet_len,
                        qtype: msg.qtype,
                        domain: msg.domain,
                        responses: msg.responses,
                    }));
                    return;
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    log::trace!("dropped malformed DNS message: {e}");
                    return;
                }
            }
        }

        self.emit(Event::Udp(UdpEvent {
            base: BaseEvent {
                timestamp: ctx.timestamp,
                saddr: ctx.saddr,
                daddr: ctx.daddr,
            },
            sport,
            dport,
            transferred: packet_len,
        }));
    }

    fn on_icmp(&mut self, ctx: PacketCtx, icmp_type: u8, icmp_code: u8, packet_len: u16) {
        self.emit(Event::Icmp(IcmpEvent {
            base: BaseEvent {
                timestamp: ctx.timestamp,
                saddr: ctx.saddr,
                daddr: ctx.daddr,
            },
            icmp_type,
            icmp_code,
            transferred: packet_len,
        }));
    }
}

pub struct Worker {
    pub id: usize,
    source: Box<dyn Source>,
    writer: EventWriter,
    ipv4: ConnectionTracker,
    ipv6: ConnectionTracker,
    stats: WorkerStats,
    output_path: PathBuf,
}

impl Worker {
    pub fn new(
        id: usize,
        source: Box<dyn Source>,
        output_path: PathBuf,
        writer_buffer_size: usize,
        file_alloc_size: u64,
        ipv4: ConnectionTracker,
        ipv6: ConnectionTracker,
    ) -> Result<Self, FileError> {
        let writer = EventWriter::open(&output_path, writer_buffer_size, file_alloc_size)?;
        Ok(Self {
            id,
            source,
            writer,
            ipv4,
            ipv6,
            stats: WorkerStats::new(),
            output_path,
        })
    }

    /// Drives the capture/parse/track/write loop until `stop` is set or the
    /// capture source is exhausted (file replay reaching EOF). Returns the
    /// final shutdown statistics.
    pub fn run(mut self, stop: Arc<AtomicBool>) -> Result<WorkerStats, FileError> {
        let mut last_sweep = Instant::now();
        let mut write_failed = false;

        'capture: while !stop.load(Ordering::Relaxed) {
            match self.source.recv() {
                Ok(frame) => {
                    self.stats.received += 1;
                    let mut hooks = WorkerHooks {
                        writer: &mut self.writer,
                        ipv4: &mut self.ipv4,
                        ipv6: &mut self.ipv6,
                        stats: &mut self.stats,
                        write_failed: false,
                    };
                    if let Err(e) = capture::dispatch(&frame, &mut hooks) {
                        self.report_malformed(e);
                    }
                    if hooks.write_failed {
                        write_failed = true;
                        break 'capture;
                    }
                }
                Err(CaptureError::Timeout) => {
                    self.on_idle(&mut last_sweep);
                }
                Err(CaptureError::Eof) => break 'capture,
                Err(e) => {
                    log::warn!("capture source error: {e}");
                    break 'capture;
                }
            }
        }

        self.stats.capacity_refused = self.ipv4.refused_syns() + self.ipv6.refused_syns();
        if let Some(dropped) = self.source.kernel_dropped() {
            self.stats.kernel_dropped = dropped;
        }
        self.writer.flush_idle()?;
        self.writer.close()?;

        if write_failed {
            log::warn!("worker {} stopped after a writer failure; {:?} remains valid up to the last flush", self.id, self.output_path);
        }

        Ok(self.stats)
    }

    fn report_malformed(&mut self, e: PacketError) {
        self.stats.malformed += 1;
        log::trace!("dropped malformed frame: {e}");
    }

    /// Idle hook (spec.md §5 "Suspension points"): flush the writer buffer
    /// on every idle poll, and run the expiry sweep at most every 10s.
    fn on_idle(&mut self, last_sweep: &mut Instant) {
        if let Err(e) = self.writer.flush_idle() {
            log::warn!("idle flush failed: {e}");
        }

        if last_sweep.elapsed() < SWEEP_INTERVAL {
            return;
        }
        *last_sweep = Instant::now();

        let now = now_us();
        let writer = &mut self.writer;
        self.ipv4.sweep(now, |e| {
            if let Err(err) = writer.write(&e) {
                log::error!("failed to write sweep-emitted tcp_end: {err}");
            }
        });
        self.ipv6.sweep(now, |e| {
            if let Err(err) = writer.write(&e) {
                log::error!("failed to write sweep-emitted tcp_end: {err}");
            }
        });
    }
}

fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
