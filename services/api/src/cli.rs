use crate::commands::{
    check_draft, list_forms, submit_draft, validate_customer, CheckArgs, SubmitArgs,
    ValidateCustomerArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use form_relay::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "form-relay",
    about = "Validate and submit web form drafts, or run the mock forms backend",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the mock backend with health and metrics endpoints (default command)
    ServeMock(ServeArgs),
    /// List the known forms and their fields
    Forms,
    /// Validate a draft file without submitting it
    Check(CheckArgs),
    /// Look up a customer number against the configured account services
    ValidateCustomer(ValidateCustomerArgs),
    /// Validate, verify and submit a draft file with optional attachments
    Submit(SubmitArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::ServeMock(ServeArgs::default()));

    match command {
        Command::ServeMock(args) => server::run(args).await,
        Command::Forms => {
            list_forms();
            Ok(())
        }
        Command::Check(args) => check_draft(args),
        Command::ValidateCustomer(args) => validate_customer(args).await,
        Command::Submit(args) => submit_draft(args).await,
    }
}
