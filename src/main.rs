fn main() {
    cv_align::cli::run();
}
