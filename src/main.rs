#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    atmail_import::init_logger();
    log::info!("Starting address book import service");
    atmail_import::rocket()
}
