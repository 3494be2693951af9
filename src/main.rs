#[actix_web::main]
async fn main() {
    if let Err(err) = evalboard_lib::run().await {
        eprintln!("evalboard: {err}");
        std::process::exit(1);
    }
}
