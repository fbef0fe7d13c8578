fn main() {
    tabtime_lib::run()
}
