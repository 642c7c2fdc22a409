use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use pesaflow::application::flow::{PaymentFlow, SessionParams};
use pesaflow::config::{ApiConfig, FlowConfig};
use pesaflow::domain::booking::BookingRequest;
use pesaflow::domain::ports::{BookingService, BookingServiceHandle, PaymentGatewayHandle};
use pesaflow::domain::session::Phase;
use pesaflow::infrastructure::http::{HttpBookingService, HttpPaymentGateway};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the booking/payment API
    #[arg(long, env = "PESAFLOW_API_URL", default_value = "http://localhost:8000/api")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a booking and pay for it with an M-Pesa STK push
    Book {
        /// Service to book (UUID)
        #[arg(long)]
        service_id: String,
        /// Consultation date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// Start time, HH:MM
        #[arg(long)]
        start_time: String,
        /// Phone number to bill (any local format)
        #[arg(long)]
        phone: String,
        /// Optional notes for the consultant
        #[arg(long)]
        notes: Option<String>,
        /// Named pricing option, if the service has tiers
        #[arg(long)]
        pricing_option: Option<String>,
    },
    /// Pay for an existing pending booking
    Pay {
        /// Booking id
        #[arg(long)]
        booking_id: String,
        /// Phone number to bill (any local format)
        #[arg(long)]
        phone: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pesaflow=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let api = ApiConfig {
        base_url: cli.api_url,
    };
    let gateway: PaymentGatewayHandle =
        Arc::new(HttpPaymentGateway::new(&api).into_diagnostic()?);
    let bookings: BookingServiceHandle =
        Arc::new(HttpBookingService::new(&api).into_diagnostic()?);
    let config = FlowConfig::from_env();

    let params = match cli.command {
        Command::Book {
            service_id,
            date,
            start_time,
            phone,
            notes,
            pricing_option,
        } => {
            let request = BookingRequest {
                service_id,
                date,
                start_time,
                payment_phone: phone.clone(),
                user_notes: notes,
                pricing_option,
            };
            request.validate().into_diagnostic()?;
            let booking = bookings.create_booking(request).await.into_diagnostic()?;
            println!(
                "Booked {} on {} at {} (booking {})",
                booking.service.name, booking.date, booking.start_time, booking.id
            );
            SessionParams::from_booking(&booking, None, Some(phone))
        }
        Command::Pay { booking_id, phone } => {
            let booking = bookings.booking(&booking_id).await.into_diagnostic()?;
            SessionParams::from_booking(&booking, None, Some(phone))
        }
    };

    println!(
        "Sending M-Pesa prompt for {} ({} KES). Check your phone and enter your PIN.",
        params.service_name, params.amount
    );
    let flow = PaymentFlow::open(gateway, bookings, config, params);

    let mut updates = flow.subscribe();
    let mut last_remaining = None;
    let settled = loop {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.phase.is_settled() {
            break snapshot;
        }
        if snapshot.remaining_secs != last_remaining {
            if let Some(secs) = snapshot.remaining_secs {
                eprint!("\rwaiting for confirmation... {secs:>2}s ");
            }
            last_remaining = snapshot.remaining_secs;
        }
        if updates.changed().await.is_err() {
            break flow.snapshot();
        }
    };
    eprintln!();
    flow.close().await;

    match settled.phase {
        Phase::Success => {
            println!("Payment confirmed. Your booking is paid.");
            Ok(())
        }
        _ => {
            let reason = settled
                .last_error
                .unwrap_or_else(|| "payment not confirmed".to_string());
            Err(miette!("{reason}"))
        }
    }
}
