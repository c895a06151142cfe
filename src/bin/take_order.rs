use take_order_engine::{FillOrder, FillRunner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // take_order <config> <buy|sell|short-sell> <market> <outcome> <shares> <price>
    let args: Vec<String> = std::env::args().collect();
    let Some(config_path) = args.get(1) else {
        eprintln!(
            "Usage: take_order <config> <buy|sell|short-sell> <market> <outcome> <shares> <price>"
        );
        std::process::exit(1);
    };
    if !std::path::Path::new(config_path).exists() {
        eprintln!("Config file '{}' not found. Please create one.", config_path);
        std::process::exit(1);
    }

    let order = match FillOrder::from_args(&args[2..]) {
        Ok(order) => order,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let runner = FillRunner::new(config_path)?;
    match runner.run(order).await {
        Ok(outcome) => println!("{}", outcome.to_json()?),
        Err(e) => {
            eprintln!("Fill error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
