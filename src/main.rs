fn main() {
    examguard_lib::run()
}
