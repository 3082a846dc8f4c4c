fn main() {
    if let Err(err) = opgraph_layout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
