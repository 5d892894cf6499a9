use adcp_pipeline::average::{AverageOptions, FieldSettings};
use adcp_pipeline::core::{Ensemble, EnsembleSource, SubsystemId};
use adcp_pipeline::engine::{AveragingRuntime, RuntimeConfig};
use adcp_pipeline::recording::RecorderConfig;
use anyhow::Result;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("ADCP Pipeline - Averaging Demo");
    println!("==============================\n");

    // Long-term: every 5 ensembles. Short-term: running average over 3.
    let mut lta = AverageOptions::default();
    lta.set_sample_count_mode(5);
    lta.beam_velocity = FieldSettings::enabled();
    lta.amplitude = FieldSettings::enabled();

    let mut sta = AverageOptions::default();
    sta.set_running_mode(3);
    sta.beam_velocity = FieldSettings::enabled();

    let mut runtime = AveragingRuntime::new(RuntimeConfig {
        lta,
        sta,
        ..RuntimeConfig::default()
    });

    let record_dir = std::env::temp_dir().join("adcp-pipeline-demo");
    runtime.enable_recording(RecorderConfig::new(&record_dir))?;
    println!("Recording averaged output under {record_dir:?}\n");

    let mut events = runtime.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!(
                "{:?} average: ensemble {} bin0 velocity {:.3} m/s",
                event.kind, event.ensemble.ensemble_number, event.ensemble.beam_velocity[0][0]
            );
        }
    });

    // Simulate an instrument producing 20 ensembles at 10 Hz.
    for n in 0..20u64 {
        let mut ens = Ensemble::with_uniform(30, 4, (n % 5) as f64 * 0.1);
        ens.ensemble_number = n;
        ens.source = EnsembleSource::Serial;
        ens.subsystem = SubsystemId::new(4, 0);
        ens.serial_number = "01200000000000000000000000000000".to_string();
        runtime.average_ensemble(&ens);
        sleep(Duration::from_millis(100)).await;
    }

    runtime.shutdown().await?;
    let snapshot = runtime.metrics();
    // Dropping the runtime closes the event channel and ends the printer.
    drop(runtime);
    let _ = printer.await;

    println!("\nReceived:  {}", snapshot.ensembles_received);
    println!("LTA out:   {}", snapshot.long_term_emitted);
    println!("STA out:   {}", snapshot.short_term_emitted);
    println!("Dropped:   {}", snapshot.ensembles_dropped);
    println!("Recorded:  {} bytes", snapshot.bytes_recorded);

    Ok(())
}
