use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;

/// Notify a checker that a maker request is waiting for review.
pub async fn send_maker_request_email(
    ses_client: &SesClient,
    sender_email: &str,
    to_email: &str,
    panel_url: &str,
) -> Result<(), String> {
    let text_body = format!(
        "New Maker Request\n\n\
         There is a new maker request awaiting review in the admin panel. \
         Go to check it out now:\n\n{}\n",
        panel_url
    );

    let destination = Destination::builder().to_addresses(to_email).build();

    let subject = Content::builder()
        .data("[Auto-Generated] New Maker Request")
        .charset("UTF-8")
        .build()
        .map_err(|e| format!("Failed to build subject: {:?}", e))?;

    let text_content = Content::builder()
        .data(text_body)
        .charset("UTF-8")
        .build()
        .map_err(|e| format!("Failed to build text content: {:?}", e))?;

    let body = Body::builder().text(text_content).build();

    let message = Message::builder().subject(subject).body(body).build();

    let email_content = EmailContent::builder().simple(message).build();

    ses_client
        .send_email()
        .from_email_address(sender_email)
        .destination(destination)
        .content(email_content)
        .send()
        .await
        .map_err(|e| format!("Failed to send email: {:?}", e))?;

    Ok(())
}
