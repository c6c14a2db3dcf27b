#[derive(clap::Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(flatten)]
    args: janus::cmd::credential_process::CredentialProcessArgs,
}

fn main() {
    use clap::Parser;
    let cli = Cli::parse();

    janus::cmd::init_tracing(cli.args.log_level());

    if let Err(e) = janus::cmd::credential_process::run(&cli.args) {
        // Stage errors already render their whole cause chain
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
