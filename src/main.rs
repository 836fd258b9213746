use report_recon::RunStatus;

fn main() {
    match report_recon::run() {
        Ok(RunStatus::Clean) => {}
        Ok(RunStatus::Differences) => std::process::exit(2),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
