use demand_forecast::config::PipelineConfig;
use demand_forecast::model::DemandForecastModel;
use demand_forecast::pipeline::Pipeline;
use demand_forecast::series::SeriesSet;
use std::path::PathBuf;

/// Usage: forecast_from_mart <mart.csv> <model.ckpt> [config.toml]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let mart = PathBuf::from(args.next().ok_or("missing mart CSV path")?);
    let model_path = PathBuf::from(args.next().ok_or("missing model checkpoint path")?);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    println!("Loading demand mart from: {}", mart.display());
    let series = SeriesSet::from_csv(&mart)?;
    if let Some((first, last)) = series.date_range() {
        println!(
            "Loaded {} tracks from {} to {}",
            series.track_count(),
            first,
            last
        );
    }

    let model = DemandForecastModel::load(&model_path)?;
    println!(
        "Model: {} features, hidden size {}, horizon {}",
        model.config().input_size,
        model.config().hidden_size,
        model.config().horizon
    );

    let pipeline = Pipeline::new(config)?;
    let forecasts = pipeline.forecast(&model, &series)?;
    for row in &forecasts.rows {
        println!("{} {}: {:.0}", row.track_id, row.target_date, row.predicted_demand);
    }

    let output = mart.with_file_name("forecast.csv");
    forecasts.write_csv(&output)?;
    println!("Wrote {} rows to {}", forecasts.len(), output.display());
    Ok(())
}
