use anyhow::{bail, Context, Result};
use seaweedfs_rust::{
    config::LogConfig, logging, AppConfig, Params, SeaweedClient, UploadEngine,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

const CONFIG_PATH: &str = "config/app.toml";

const USAGE: &str = "\
用法: seaweedfs-rust [--config <配置文件>] <命令> [参数]

命令:
  upload <文件> [--collection <集合>] [--ttl <过期时间>]
  batch <文件>... [--collection <集合>] [--ttl <过期时间>]
  lookup <文件ID>
  delete <文件ID>
  download <文件ID> [输出文件]
  status";

/// 命令行子命令
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Upload {
        path: PathBuf,
        collection: String,
        ttl: String,
    },
    Batch {
        paths: Vec<PathBuf>,
        collection: String,
        ttl: String,
    },
    Lookup {
        file_id: String,
    },
    Delete {
        file_id: String,
    },
    Download {
        file_id: String,
        output: Option<PathBuf>,
    },
    Status,
}

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    config_path: String,
    command: Command,
}

/// 解析命令行参数（不含程序名）
fn parse_args(args: Vec<String>) -> Result<CliArgs> {
    let mut config_path = CONFIG_PATH.to_string();
    let mut collection = String::new();
    let mut ttl = String::new();
    let mut positional = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config_path = iter.next().context("--config 缺少参数")?,
            "--collection" => collection = iter.next().context("--collection 缺少参数")?,
            "--ttl" => ttl = iter.next().context("--ttl 缺少参数")?,
            "-h" | "--help" => bail!("{}", USAGE),
            _ => positional.push(arg),
        }
    }

    if positional.is_empty() {
        bail!("{}", USAGE);
    }
    let name = positional.remove(0);

    let command = match (name.as_str(), positional.len()) {
        ("upload", 1) => Command::Upload {
            path: PathBuf::from(&positional[0]),
            collection,
            ttl,
        },
        ("batch", n) if n > 0 => Command::Batch {
            paths: positional.iter().map(PathBuf::from).collect(),
            collection,
            ttl,
        },
        ("lookup", 1) => Command::Lookup {
            file_id: positional.remove(0),
        },
        ("delete", 1) => Command::Delete {
            file_id: positional.remove(0),
        },
        ("download", 1) | ("download", 2) => Command::Download {
            file_id: positional.remove(0),
            output: positional.pop().map(PathBuf::from),
        },
        ("status", 0) => Command::Status,
        _ => bail!("无效的命令或参数: {}\n\n{}", name, USAGE),
    };

    Ok(CliArgs {
        config_path,
        command,
    })
}

/// 读取日志配置（此时日志系统尚未初始化，失败时静默回退默认值）
async fn load_log_config(config_path: &str) -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(config_path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match parse_args(std::env::args().skip(1).collect()) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let log_config = load_log_config(&cli.config_path).await;
    let _log_guard = logging::init_logging(&log_config);

    let mut config = AppConfig::load_or_default(&cli.config_path).await;
    config.client.apply_env_overrides();
    config.client.validate()?;

    info!(
        "SeaweedFS 客户端启动: master={}, scheme={}, chunk_size={}",
        config.client.master, config.client.scheme, config.client.chunk_size
    );

    let engine = UploadEngine::from_config(&config.client)?;
    run(&engine, cli.command).await
}

async fn run(engine: &UploadEngine, command: Command) -> Result<()> {
    let client: &SeaweedClient = engine.client();

    match command {
        Command::Upload {
            path,
            collection,
            ttl,
        } => {
            let outcome = engine.upload_file(&path, &collection, &ttl).await?;
            print_json(&serde_json::json!({
                "fid": outcome.file_id,
                "server": outcome.server,
                "url": outcome.url,
                "size": outcome.size,
                "chunks": outcome.manifest.as_ref().map(|m| m.chunks.len()).unwrap_or(0),
            }))
        }
        Command::Batch {
            paths,
            collection,
            ttl,
        } => match engine.batch_upload_files(paths.as_slice(), &collection, &ttl).await {
            Ok(results) => print_json(&results),
            Err(e) => {
                print_json(&e.results)?;
                Err(e.into())
            }
        },
        Command::Lookup { file_id } => {
            let url = client.lookup_file_id(&file_id, &Params::new(), true).await?;
            println!("{}", url);
            Ok(())
        }
        Command::Delete { file_id } => {
            client.delete_file(&file_id, &Params::new()).await?;
            println!("已删除: {}", file_id);
            Ok(())
        }
        Command::Download { file_id, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(file_id.replace(',', "_")));
            let mut file = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("创建输出文件失败: {:?}", output))?;
            let name = client
                .download_file(&file_id, &Params::new(), &mut file)
                .await?;
            println!(
                "已下载: {} -> {:?}{}",
                file_id,
                output,
                name.map(|n| format!(" (服务端文件名: {})", n))
                    .unwrap_or_default()
            );
            Ok(())
        }
        Command::Status => print_json(&client.status().await?),
    }
}
