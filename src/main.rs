use coin_flip::{
    config::{
        AppConfig,
        CliArgs,
    },
    identity::DEFAULT_IDENTITY_PROVIDER_URL,
    logging,
    wager::DEFAULT_BET,
};
use color_eyre::eyre::{
    Result,
    eyre,
};

mod client;
mod ui;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: coin-flip [--ledger-url <url>] [--identity-url <url>]\n\
         [--config-dir <path>] [--bet <n>] [--log-dir <path> | --no-log] [--save]\n\
         \n\
         Flags:\n\
           --ledger-url <url>    Ledger service endpoint (required unless saved)\n\
           --identity-url <url>  Identity provider endpoint (default {})\n\
           --config-dir <path>   Settings and session directory (defaults to ~/.coin-flip)\n\
           --bet <n>             Initial bet amount (default {})\n\
           --log-dir <path>      Write logs here instead of <config-dir>/logs\n\
           --no-log              Disable file logging\n\
           --save                Remember the ledger URL, identity URL and bet in settings.json",
        DEFAULT_IDENTITY_PROVIDER_URL, DEFAULT_BET,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ledger-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--ledger-url requires a URL argument"))?;
                if cli.ledger_url.is_some() {
                    return Err(eyre!("--ledger-url may only be specified once"));
                }
                cli.ledger_url = Some(url);
            }
            "--identity-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--identity-url requires a URL argument"))?;
                if cli.identity_url.is_some() {
                    return Err(eyre!("--identity-url may only be specified once"));
                }
                cli.identity_url = Some(url);
            }
            "--config-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--config-dir requires a path argument"))?;
                if cli.config_dir.is_some() {
                    return Err(eyre!("--config-dir may only be specified once"));
                }
                cli.config_dir = Some(dir);
            }
            "--bet" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--bet requires an amount"))?;
                let bet = raw
                    .parse::<u64>()
                    .map_err(|e| eyre!("--bet expects a whole number, got {raw:?}: {e}"))?;
                cli.bet = Some(bet);
            }
            "--log-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                cli.log_dir = Some(dir);
            }
            "--no-log" => cli.no_log = true,
            "--save" => cli.save = true,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    if cli.no_log && cli.log_dir.is_some() {
        return Err(eyre!("--log-dir and --no-log cannot be combined"));
    }
    Ok(cli)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = AppConfig::resolve(parse_cli_args()?)?;
    if let Some(log_dir) = &config.log_dir {
        logging::init_file_logging(log_dir)?;
    }
    client::run_app(config).await
}
