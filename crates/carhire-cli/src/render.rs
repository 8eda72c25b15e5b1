//! Plain-text rendering of screens and action results.

use anyhow::{anyhow, Result};

use carhire_core::models::{Car, Profile};
use carhire_core::{ActionOutcome, Dispatched, GuardDecision, Refusal, Route, Session};

/// Print a dispatched result; anything but success becomes an error so the
/// process exits non-zero.
pub fn outcome<T>(result: Dispatched<T>, on_success: impl FnOnce(T)) -> Result<()> {
    match result {
        Ok(ActionOutcome::Success(value)) => {
            on_success(value);
            Ok(())
        }
        Ok(ActionOutcome::ValidationFailure(message)) => Err(anyhow!(message)),
        Ok(ActionOutcome::AuthFailure) => Err(anyhow!(
            "Your session has expired. Run `carhire login` to sign in again."
        )),
        Ok(ActionOutcome::NetworkFailure(message)) => {
            Err(anyhow!("Could not reach the server: {}", message))
        }
        Err(Refusal::InFlight) => Err(anyhow!("Already in progress")),
        Err(Refusal::Guard(decision)) => refused(decision),
    }
}

pub fn refused(decision: GuardDecision) -> Result<()> {
    match decision {
        GuardDecision::Allow => Ok(()),
        GuardDecision::Redirect(Route::Login) => {
            Err(anyhow!("Not logged in. Run `carhire login` first."))
        }
        GuardDecision::Redirect(route) => Err(anyhow!("Continue at {}", route.title())),
        GuardDecision::Block => Err(anyhow!("This requires an administrator account.")),
        GuardDecision::Pending => Err(anyhow!("Still loading, try again.")),
    }
}

pub fn session(session: &Session, is_admin: bool) {
    match session {
        Session::Authenticated { .. } if is_admin => println!("Logged in (administrator)"),
        Session::Authenticated { .. } => println!("Logged in"),
        Session::Unauthenticated | Session::Unknown => println!("Not logged in"),
    }
}

pub fn cars(cars: &[Car]) {
    if cars.is_empty() {
        println!("No cars available.");
        return;
    }
    for car in cars {
        println!(
            "{:>6}  {:<24} {:>4}  {:<10} {}",
            car.id,
            car.display_name(),
            car.year,
            car.fuel,
            car.price_display()
        );
    }
}

pub fn profile(profile: &Profile) {
    println!("Welcome to your profile, {}", profile.username);
}
