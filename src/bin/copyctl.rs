//! Control CLI
//!
//! Publishes task commands onto the engine's command channel. The engine
//! process validates and applies them; watch the `notifications` channel
//! for results.
//!
//! ```text
//! copyctl add-mock --target 0x... --amount 100 --finance 1000 [--profile URL]
//! copyctl add-live --target 0x... --amount 100 --wallet 0x... [--key-env PRIVATE_KEY]
//! copyctl stop <id> | restart <id> | remove <id> | remove-all | list
//! ```

use anyhow::{bail, Context};
use serde_json::json;
use std::collections::HashMap;

use copytrader::infrastructure::store::{pubsub, RedisStore, TaskStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        std::process::exit(2);
    };

    let redis_url =
        std::env::var("REDIS_URL").context("REDIS_URL must be set")?;
    let store = RedisStore::connect(&redis_url)
        .await
        .context("shared store unreachable")?;

    let flags = parse_flags(&args[1..]);

    let payload = match command.as_str() {
        "add-mock" => {
            let target = require_flag(&flags, "target")?;
            let amount: f64 = require_flag(&flags, "amount")?.parse()?;
            let finance: f64 = require_flag(&flags, "finance")?.parse()?;
            let mut body = json!({
                "action": "add",
                "mode": "mock",
                "targetAddress": target,
                "fixedAmount": amount,
                "initialFinance": finance,
            });
            if let Some(profile) = flags.get("profile") {
                body["profileUrl"] = json!(profile);
            }
            body.to_string()
        }
        "add-live" => {
            let target = require_flag(&flags, "target")?;
            let amount: f64 = require_flag(&flags, "amount")?.parse()?;
            let wallet = require_flag(&flags, "wallet")?;
            let key_env = flags
                .get("key-env")
                .map(String::as_str)
                .unwrap_or("PRIVATE_KEY");
            let private_key = std::env::var(key_env)
                .with_context(|| format!("{} must be set for add-live", key_env))?;
            json!({
                "action": "add",
                "mode": "live",
                "targetAddress": target,
                "fixedAmount": amount,
                "operatorWallet": wallet,
                "privateKey": private_key,
            })
            .to_string()
        }
        "stop" | "restart" | "remove" => {
            let Some(id) = args.get(1).filter(|a| !a.starts_with("--")) else {
                bail!("{} requires a task id", command);
            };
            json!({ "action": command, "id": id }).to_string()
        }
        "remove-all" => json!({ "action": "remove", "all": true }).to_string(),
        "list" => {
            let tasks = TaskStore::new(&store).list(None).await?;
            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in tasks {
                println!(
                    "{}  {:5}  {:7}  target={}  fixed={:.2}  balance={:.2}",
                    task.id,
                    task.mode.as_str(),
                    format!("{:?}", task.status).to_lowercase(),
                    task.target_address,
                    task.fixed_amount,
                    task.current_balance,
                );
            }
            return Ok(());
        }
        other => {
            eprintln!("unknown command '{}'", other);
            print_usage();
            std::process::exit(2);
        }
    };

    pubsub::publish_command(&store, &payload)
        .await
        .context("failed to publish command")?;
    println!("sent: {}", command);
    Ok(())
}

fn parse_flags(args: &[String]) -> HashMap<String, String> {
    let mut flags = HashMap::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--") {
            if let Some(value) = iter.next() {
                flags.insert(name.to_string(), value.clone());
            }
        }
    }
    flags
}

fn require_flag<'a>(flags: &'a HashMap<String, String>, name: &str) -> anyhow::Result<&'a String> {
    flags
        .get(name)
        .with_context(|| format!("--{} is required", name))
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  copyctl add-mock --target <addr> --amount <usd> --finance <usd> [--profile <url>]");
    eprintln!("  copyctl add-live --target <addr> --amount <usd> --wallet <addr> [--key-env <VAR>]");
    eprintln!("  copyctl stop <id>");
    eprintln!("  copyctl restart <id>");
    eprintln!("  copyctl remove <id>");
    eprintln!("  copyctl remove-all");
    eprintln!("  copyctl list");
}
