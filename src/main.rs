use rocket::{Build, Rocket};

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    kamero_api::rocket()
}
