use chrono::NaiveDate;
use demand_forecast::catalog::{Catalog, Track};
use demand_forecast::config::PipelineConfig;
use demand_forecast::pipeline::Pipeline;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A small in-memory catalog
    let release = NaiveDate::from_ymd_opt(2023, 5, 12).ok_or("invalid release date")?;
    let tracks = [
        ("TRK-001", "pop", 85.0),
        ("TRK-002", "pop", 40.0),
        ("TRK-003", "hip-hop", 70.0),
        ("TRK-004", "jazz", 15.0),
        ("TRK-005", "electronic", 55.0),
    ]
    .iter()
    .map(|(id, genre, popularity)| Track {
        track_id: id.to_string(),
        genre: genre.to_string(),
        popularity_score: *popularity,
        duration_seconds: 210,
        release_date: release,
        artist_id: format!("ART-{}", &id[4..]),
        track_name: None,
    })
    .collect();
    let catalog = Catalog::new(tracks)?;

    let config = PipelineConfig {
        num_epochs: 10,
        hidden_size: 16,
        learning_rate: 0.005,
        horizon: 7,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config)?;

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("invalid start date")?;
    let end = NaiveDate::from_ymd_opt(2024, 6, 30).ok_or("invalid end date")?;
    let series = pipeline.generate(&catalog, start, end)?;
    println!(
        "Generated {} rows for {} tracks ({:.0} streams in total)",
        series.len(),
        series.track_count(),
        series.total_streams()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let outcome = pipeline.train(&series, Some(&catalog), Some((start, end)), stop)?;

    for epoch in &outcome.run.epochs {
        println!(
            "epoch {:>2}: train {:.4}  validation {}",
            epoch.epoch,
            epoch.train_loss,
            epoch
                .validation_loss
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("{}", outcome.evaluation);

    println!("Next {} days:", pipeline.config().horizon);
    for row in outcome.forecasts.rows.iter().filter(|r| r.actual_demand.is_none()) {
        println!("  {} {}: {:.0}", row.track_id, row.target_date, row.predicted_demand);
    }

    Ok(())
}
