fn main() {
    space_hawks::run_cli();
}
