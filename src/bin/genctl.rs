fn main() {
    std::process::exit(nixos_genctl::cli::run());
}
