#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    chatcore::rocket().launch().await?;
    Ok(())
}
