use clap::Parser;
use pymake::PyMake;

fn main() {
    let cli = PyMake::parse();
    if let Err(e) = cli.run() {
        e.print();
        std::process::exit(e.exit_code());
    }
}
