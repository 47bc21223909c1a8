//! # BalanceBot Simulator
//!
//! 在 mock 硬件上运行完整的控制线程和行为仲裁，用于调参和演示。
//!
//! ```bash
//! # 默认参数运行 10 秒
//! balancebot-sim run
//!
//! # 3 秒后在前方 0.2 米处出现障碍物
//! balancebot-sim run --obstacle-at-ms 3000 --duration-ms 8000
//!
//! # 打印默认配置（可保存为 robot.toml 后修改）
//! balancebot-sim config
//! ```

mod console;

use anyhow::{Context, Result};
use balancebot_sdk::hal::OperatorFeedback;
use balancebot_sdk::hal::mock::{
    ChannelConfirmation, GyroProbe, MockBattery, MockGyro, MockMotor, MockProximity,
    ReadingProbe,
};
use balancebot_sdk::{LoopHardware, Robot, RobotConfig, RobotDevices, init_logging};
use clap::{Args, Parser, Subcommand};
use console::{ConsoleAudio, ConsoleDisplay};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// BalanceBot 仿真器
#[derive(Parser, Debug)]
#[command(name = "balancebot-sim")]
#[command(about = "Run the balancing robot on simulated hardware", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行仿真
    Run(RunArgs),

    /// 打印配置（TOML）
    Config {
        /// 配置文件路径（不指定则打印默认值）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 运行时长（毫秒），0 表示直到 Ctrl+C
    #[arg(long, default_value_t = 10_000)]
    duration_ms: u64,

    /// 前方距离（米）
    #[arg(long, default_value_t = 1.0)]
    distance: f64,

    /// 在指定时间（毫秒）把前方距离改为 0.2 米，一秒后移走
    #[arg(long)]
    obstacle_at_ms: Option<u64>,

    /// 电池电压（伏特）
    #[arg(long, default_value_t = 7.2)]
    voltage: f64,

    /// 陀螺仪角速度基准值（deg/s）
    #[arg(long, default_value_t = 0.0)]
    gyro_rate: f64,

    /// 陀螺仪噪声幅度（deg/s）
    #[arg(long, default_value_t = 0.5)]
    gyro_noise: f64,

    /// 模拟操作员在提示后多久按下确认（毫秒）
    #[arg(long, default_value_t = 2_000)]
    auto_confirm_ms: u64,
}

fn main() -> Result<()> {
    init_logging("info")?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Config { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        },
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RobotConfig> {
    match path {
        Some(path) => RobotConfig::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(RobotConfig::default()),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;

    let (left_motor, _) = MockMotor::new();
    let (right_motor, _) = MockMotor::new();
    let (gyro, gyro_probe) = MockGyro::new();
    let (proximity, proximity_probe) = MockProximity::new(args.distance);
    let (battery, _) = MockBattery::new(args.voltage);
    // trigger 必须存活到仿真结束，否则确认输入会断开
    let (_trigger, confirmation) = ChannelConfirmation::new();
    let confirmation =
        confirmation.with_auto_confirm(Duration::from_millis(args.auto_confirm_ms));

    let devices = RobotDevices {
        hardware: LoopHardware::new(left_motor, right_motor, gyro),
        proximity: Box::new(proximity),
        battery: Box::new(battery),
        confirmation: Arc::new(confirmation),
        feedback: OperatorFeedback::new(ConsoleDisplay, ConsoleAudio),
    };
    let mut robot = Robot::new(config, devices)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt signal. Shutting down...");
            stop.store(true, Ordering::Release);
        })
        .context("failed to set signal handler")?;
    }

    let sensors = spawn_sensor_feed(
        SensorScript {
            gyro: gyro_probe,
            gyro_rate: args.gyro_rate,
            gyro_noise: args.gyro_noise,
            proximity: proximity_probe,
            distance: args.distance,
            obstacle_at: args.obstacle_at_ms.map(Duration::from_millis),
            duration: (args.duration_ms > 0).then(|| Duration::from_millis(args.duration_ms)),
        },
        stop.clone(),
    )?;

    info!("Simulation started");
    robot.run(&stop);

    robot.shutdown()?;
    if sensors.join().is_err() {
        warn!("Sensor feed thread panicked");
    }

    let balance_loop = robot.balance_loop();
    println!("metrics: {}", robot.metrics());
    println!(
        "final state: angle {:.2} deg, last command {:?}",
        balance_loop.angle(),
        balance_loop.last_command()
    );
    Ok(())
}

const OBSTACLE_LIFETIME: Duration = Duration::from_secs(1);

struct SensorScript {
    gyro: Arc<GyroProbe>,
    gyro_rate: f64,
    gyro_noise: f64,
    proximity: Arc<ReadingProbe>,
    distance: f64,
    obstacle_at: Option<Duration>,
    duration: Option<Duration>,
}

/// 周期性刷新模拟读数；到达时长后置位 `stop`
fn spawn_sensor_feed(
    script: SensorScript,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("balancebot-sim-sensors".into())
        .spawn(move || {
            let mut rng = rand::thread_rng();
            let started = Instant::now();
            let mut obstacle: Option<Duration> = None;

            while !stop.load(Ordering::Acquire) {
                let elapsed = started.elapsed();
                if let Some(duration) = script.duration
                    && elapsed >= duration
                {
                    info!("Simulation time elapsed ({:?})", duration);
                    stop.store(true, Ordering::Release);
                    break;
                }

                let noise = if script.gyro_noise > 0.0 {
                    rng.gen_range(-script.gyro_noise..=script.gyro_noise)
                } else {
                    0.0
                };
                script.gyro.set_rate(script.gyro_rate + noise);

                match obstacle {
                    None => {
                        if let Some(at) = script.obstacle_at
                            && elapsed >= at
                        {
                            info!("Obstacle placed 0.2 m ahead");
                            script.proximity.set(0.2);
                            obstacle = Some(elapsed);
                        }
                    },
                    Some(placed) => {
                        if elapsed >= placed + OBSTACLE_LIFETIME
                            && script.proximity.get() < script.distance
                        {
                            info!("Obstacle removed");
                            script.proximity.set(script.distance);
                        }
                    },
                }

                thread::sleep(Duration::from_millis(10));
            }
        })
        .context("failed to spawn sensor thread")?;
    Ok(handle)
}
