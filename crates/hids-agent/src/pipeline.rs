//! Wires collector -> process tracker -> risk scorer -> anomaly detector ->
//! connection analyzer -> alert gate -> snapshot writer (spec.md §5).
//!
//! Concurrency idiom grounded in `oisp-core::pipeline` (tokio tasks +
//! channels) and `oisp-core::metrics::MetricsCollector` (`parking_lot`
//! under the hot path).

use std::process;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use hids_anomaly::AnomalyDetector;
use hids_collect::{AuditLogCollector, KernelProbeCollector, KernelProbeConfig};
use hids_core::alert::{AlertClass, AlertGate, PatternDetails};
use hids_core::collector::{Collector, EventHandler};
use hids_core::config::{CollectorKind, HidsConfig};
use hids_core::events::SyscallEvent;
use hids_core::process::ProcessTracker;
use hids_core::stats::AgentStats;
use hids_netwatch::{ConnectionAnalyzer, ConnectionAnalyzerConfig, PatternVerdict};
use hids_risk::RiskScorer;
use hids_snapshot::{Snapshot, SnapshotWriter};

use crate::response::LoggingResponseHandler;

/// Number of ingest shards; events for a given pid always land on the same
/// shard, preserving per-pid order (spec.md §5).
const INGEST_SHARDS: usize = 4;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Everything the ingest path needs, shared across shard tasks.
struct Context {
    tracker: ProcessTracker,
    stats: AgentStats,
    risk_scorer: RiskScorer,
    anomaly_detector: AnomalyDetector,
    connection_analyzer: ConnectionAnalyzer,
    alert_gate: AlertGate,
    risk_threshold: f64,
}

fn pattern_alert_fields(verdict: &PatternVerdict) -> (AlertClass, PatternDetails) {
    let details = match verdict {
        PatternVerdict::Beaconing {
            destination,
            mean_interval,
            stdev,
            ..
        } => PatternDetails {
            destination: destination.clone(),
            mean_interval: Some(*mean_interval),
            stdev: Some(*stdev),
            unique_ports: None,
            rate: None,
            bytes_sent: None,
        },
        PatternVerdict::PortScanning {
            unique_ports, rate, ..
        } => PatternDetails {
            destination: String::new(),
            mean_interval: None,
            stdev: None,
            unique_ports: Some(*unique_ports),
            rate: Some(*rate),
            bytes_sent: None,
        },
        PatternVerdict::DataExfiltration { bytes_sent, .. } => PatternDetails {
            destination: String::new(),
            mean_interval: None,
            stdev: None,
            unique_ports: None,
            rate: None,
            bytes_sent: Some(*bytes_sent),
        },
    };
    let class = match verdict {
        PatternVerdict::Beaconing { .. } => AlertClass::C2Beaconing,
        PatternVerdict::PortScanning { .. } => AlertClass::PortScanning,
        PatternVerdict::DataExfiltration { .. } => AlertClass::DataExfiltration,
    };
    (class, details)
}

fn process_event(ctx: &Context, event: SyscallEvent) {
    let Some(mut record) = ctx.tracker.record_event(&event) else {
        return;
    };
    ctx.stats.record_syscall();

    let recent: Vec<String> = record.recent_syscalls().iter().cloned().collect();
    let anomaly = ctx
        .anomaly_detector
        .infer(event.pid, &recent, event.resources);
    let risk = ctx.risk_scorer.score(&recent, event.resources, anomaly.score);

    ctx.tracker.update_scores(
        event.pid,
        risk,
        anomaly.score,
        anomaly.verdict,
        anomaly.explanation.clone(),
    );
    record.risk_score = risk;
    record.anomaly_score = anomaly.score;
    record.explanation = anomaly.explanation.clone();

    let now = event.timestamp;

    if risk >= ctx.risk_threshold && ctx.alert_gate.should_emit(&record, AlertClass::HighRisk, now)
    {
        let (alert, action) = ctx.alert_gate.build_alert(&record, AlertClass::HighRisk, now, None);
        info!(?alert, ?action, "alert");
    }

    if anomaly.verdict && ctx.alert_gate.should_emit(&record, AlertClass::MlAnomaly, now) {
        let (alert, action) = ctx.alert_gate.build_alert(&record, AlertClass::MlAnomaly, now, None);
        info!(?alert, ?action, "alert");
    }

    if let Some(net) = event.network_info() {
        if let Some(verdict) =
            ctx.connection_analyzer
                .analyze(event.pid, &net.dest_ip, net.dest_port, now, &record.name)
        {
            let (class, details) = pattern_alert_fields(&verdict);
            if ctx.alert_gate.should_emit(&record, class, now) {
                let (alert, action) = ctx.alert_gate.build_alert(&record, class, now, Some(details));
                info!(?alert, ?action, technique = verdict.technique(), "pattern alert");
            }
        }
        if let Some(verdict) =
            ctx.connection_analyzer
                .track_data_transfer(event.pid, net.bytes_sent, net.bytes_received)
        {
            let (class, details) = pattern_alert_fields(&verdict);
            if ctx.alert_gate.should_emit(&record, class, now) {
                let (alert, action) = ctx.alert_gate.build_alert(&record, class, now, Some(details));
                info!(?alert, ?action, technique = verdict.technique(), "pattern alert");
            }
        }
    }
}

fn build_collector(config: &HidsConfig) -> Arc<dyn Collector> {
    match config.collector.kind {
        CollectorKind::KernelProbe => {
            Arc::new(KernelProbeCollector::new(KernelProbeConfig::default()))
        }
        CollectorKind::LogTail => {
            let path = config
                .collector
                .audit_log_path
                .clone()
                .unwrap_or_else(|| "/var/log/audit/audit.log".into());
            Arc::new(AuditLogCollector::new(path))
        }
    }
}

/// Runs the agent until interrupted: starts the collector, ingest shards,
/// reaper, and snapshot ticker, then blocks on Ctrl-C.
pub async fn run(config: HidsConfig) -> anyhow::Result<()> {
    let model_path = hids_anomaly::detector::default_model_path();
    let anomaly_detector = AnomalyDetector::load_or_unfitted(&model_path);

    let response_handler = Box::new(LoggingResponseHandler {
        warn_threshold: config.response.warn_threshold,
        freeze_threshold: config.response.freeze_threshold,
        isolate_threshold: config.response.isolate_threshold,
        kill_threshold: config.response.kill_threshold,
    });

    let alert_gate = AlertGate::new(config.detection.warmup_period_seconds).with_response_handler(
        response_handler,
        config.response.enable_responses,
        config.response.warn_threshold,
        config.response.freeze_threshold,
        config.response.isolate_threshold,
        config.response.kill_threshold,
    );

    let context = Arc::new(Context {
        tracker: ProcessTracker::new(process::id(), config.detection.excluded_processes.clone()),
        stats: AgentStats::new(),
        risk_scorer: RiskScorer::new(),
        anomaly_detector,
        connection_analyzer: ConnectionAnalyzer::new(ConnectionAnalyzerConfig {
            beacon_variance_threshold: config.connection.beacon_variance_threshold,
            min_connections_for_beacon: config.connection.min_connections_for_beacon,
            min_beacon_interval: config.connection.min_beacon_interval,
            port_scan_threshold: config.connection.port_scan_threshold,
            port_scan_timeframe: config.connection.port_scan_timeframe,
            exfiltration_threshold: config.connection.exfiltration_threshold,
        }),
        alert_gate,
        risk_threshold: config.detection.risk_threshold,
    });

    let mut senders = Vec::with_capacity(INGEST_SHARDS);
    for shard in 0..INGEST_SHARDS {
        let (tx, mut rx) = mpsc::unbounded_channel::<SyscallEvent>();
        senders.push(tx);
        let ctx = context.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                process_event(&ctx, event);
            }
            info!(shard, "ingest shard drained");
        });
    }

    let handler: EventHandler = Arc::new(move |event: SyscallEvent| {
        let shard = (event.pid as usize) % senders.len();
        if senders[shard].send(event).is_err() {
            warn!(shard, "ingest shard receiver dropped, event lost");
        }
    });

    let collector = build_collector(&config);
    if !collector.is_available() {
        anyhow::bail!("collector {} is not available on this host", collector.name());
    }
    collector.start(handler).await?;
    info!(collector = collector.name(), "collector started");

    let reaper_tracker = context.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let evicted = reaper_tracker.tracker.reap_inactive(now_secs());
            if evicted > 0 {
                info!(evicted, "reaped inactive processes");
            }
        }
    });

    let snapshot_ctx = context.clone();
    let snapshot_writer = SnapshotWriter::new(
        config.snapshot.primary_path.clone(),
        config
            .snapshot
            .fallback_path
            .clone()
            .or_else(hids_snapshot::default_fallback_path),
    );
    let snapshot_interval = config.snapshot.interval_secs.max(0.1);
    let risk_threshold = config.detection.risk_threshold;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs_f64(snapshot_interval));
        loop {
            ticker.tick().await;
            write_snapshot(&snapshot_ctx, &snapshot_writer, risk_threshold);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    collector.stop().await?;

    let final_writer = SnapshotWriter::new(
        config.snapshot.primary_path.clone(),
        config.snapshot.fallback_path.clone().or_else(hids_snapshot::default_fallback_path),
    );
    write_snapshot(&context, &final_writer, config.detection.risk_threshold);

    Ok(())
}

fn write_snapshot(ctx: &Context, writer: &SnapshotWriter, risk_threshold: f64) {
    let now = now_secs();
    let (recent_c2, recent_scans) = ctx.connection_analyzer.recent_detections(now, 300.0);
    let mut derived = ctx
        .stats
        .derive(&ctx.tracker, risk_threshold, recent_c2, recent_scans, now);

    // During warm-up no detection counter may surface, regardless of what
    // happened underneath (spec.md §4.7, §8 scenario 5).
    if !ctx.alert_gate.warmup_elapsed() {
        derived.high_risk = 0;
        derived.anomalies = 0;
        derived.recent_c2 = 0;
        derived.recent_scans = 0;
    }

    let records = ctx.tracker.snapshot();
    let snapshot = Snapshot::build(&records, derived, now);
    if let Err(err) = writer.write(&snapshot) {
        error!(error = %err, "snapshot write failed");
    }
}
