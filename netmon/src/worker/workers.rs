//! Spawns one worker thread per `Configuration::workers`, optionally pinned
//! to a CPU core (spec.md §6 "--processors"), and joins them all once the
//! shared stop flag is set or every capture source has run dry.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::capture::file::FileReplay;
use crate::capture::live::LiveCapture;
use crate::capture::Source;
use crate::config::{Configuration, ProcessorList};
use crate::stats::WorkerStats;
use crate::tcp::ConnectionTracker;
use crate::worker::worker::Worker;

/// Runs every configured worker to completion and returns each one's
/// shutdown statistics, in worker-id order. A worker that panics or returns
/// a writer error is logged and simply omitted from the result.
pub fn run(config: &Configuration, stop: Arc<AtomicBool>) -> anyhow::Result<Vec<WorkerStats>> {
    let cpu_list = resolve_cpu_list(&config.processors);

    let mut handles = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let source = open_source(config, id)?;
        let output_path = config.worker_filename(id);
        let ipv4 = ConnectionTracker::new(
            config.ipv4.max_connections,
            config.ipv4.connection_timeout_us,
            config.ipv4.time_wait_us,
        );
        let ipv6 = ConnectionTracker::new(
            config.ipv6.max_connections,
            config.ipv6.connection_timeout_us,
            config.ipv6.time_wait_us,
        );
        let worker = Worker::new(
            id,
            source,
            output_path,
            config.writer_buffer_size,
            config.file_alloc_size,
            ipv4,
            ipv6,
        )?;
        let stop = Arc::clone(&stop);
        let cpu = cpu_list.as_ref().map(|list| list[id % list.len()]);

        let handle = thread::Builder::new()
            .name(format!("netmon-worker-{id}"))
            .spawn(move || {
                if let Some(cpu) = cpu {
                    if let Err(e) = pin_to_cpu(cpu) {
                        log::warn!("worker {id} failed to pin to cpu {cpu}: {e}");
                    }
                }
                worker.run(stop)
            })?;
        handles.push(handle);
    }

    let mut stats = Vec::with_capacity(handles.len());
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(s)) => stats.push(s),
            Ok(Err(e)) => log::error!("worker {id} exited after a writer error: {e}"),
            Err(_) => log::error!("worker {id} thread panicked"),
        }
    }
    Ok(stats)
}

fn open_source(config: &Configuration, id: usize) -> anyhow::Result<Box<dyn Source>> {
    if let Some(path) = &config.replay_file {
        log::info!("worker {id} replaying capture file {}", path.display());
        return Ok(Box::new(FileReplay::open(path)?));
    }

    let snaplen = config.ring_buffer.frame_size as i32;
    let source = LiveCapture::open(
        &config.device,
        config.promiscuous,
        snaplen,
        config.receive_buffer_size as i32,
    )?;
    Ok(Box::new(source))
}

/// Expands the `--processors` setting into a concrete CPU id list the
/// workers are round-robined over. `All` leaves affinity untouched -- the
/// scheduler picks, same as if netmon had never called `sched_setaffinity`.
fn resolve_cpu_list(processors: &ProcessorList) -> Option<Vec<usize>> {
    let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    match processors {
        ProcessorList::All => None,
        ProcessorList::Even => Some((0..available).step_by(2).collect()),
        ProcessorList::Odd => Some((1..available).step_by(2).collect()),
        ProcessorList::Explicit(list) => Some(list.clone()),
    }
}

fn pin_to_cpu(cpu: usize) -> nix::Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &set)
}
