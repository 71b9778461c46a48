use crate::infra::{open_ledger, parse_date, parse_period};
use chrono::{Local, NaiveDate};
use clap::Args;
use dormitory::config::{AppConfig, HousingConfig};
use dormitory::error::AppError;
use dormitory::telemetry;
use dormitory::workflows::billing::{
    BillingPeriod, MeterReading, MeterReadingImporter, PriceDraft, ProrationCalculator,
    RentBreakdown,
};
use dormitory::workflows::housing::{
    Actor, BedId, ContractPolicy, HousingError, HousingLedger, PaymentPublisher,
    RegistrationRequest, Role, RoomId, RoomSpec, RoomType, SnapshotStore, StudentId,
    TransferSubmission,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct RentQuoteArgs {
    /// First day of occupancy (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) start: NaiveDate,
    /// Last day of occupancy (YYYY-MM-DD); omit for an open-ended contract
    #[arg(long, value_parser = parse_date)]
    pub(crate) end: Option<NaiveDate>,
    /// Monthly room rate in VND
    #[arg(long)]
    pub(crate) monthly_rate: u64,
}

#[derive(Args, Debug)]
pub(crate) struct UtilityImportArgs {
    /// CSV export with Room, Period, Prior/New Electricity and Prior/New Water columns
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Only record readings for this billing period (YYYY-MM)
    #[arg(long, value_parser = parse_period)]
    pub(crate) period: Option<BillingPeriod>,
    /// Staff identifier recorded as the author of the bills
    #[arg(long, default_value = "meter-import")]
    pub(crate) actor: String,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Move-in date for the demo registrations (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) move_in: Option<NaiveDate>,
    /// Contract length in months
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=24))]
    pub(crate) contract_months: Option<u32>,
}

pub(crate) fn run_rent_quote(args: RentQuoteArgs) -> Result<(), AppError> {
    let breakdown = ProrationCalculator::standard()
        .compute_rent(args.start, args.end, args.monthly_rate)
        .map_err(HousingError::from)?;

    println!(
        "Rent quote from {} to {}",
        args.start,
        args.end
            .map(|end| end.to_string())
            .unwrap_or_else(|| "open-ended".to_string())
    );
    render_breakdown(&breakdown);
    Ok(())
}

pub(crate) fn run_utility_import(args: UtilityImportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let ledger = open_ledger(&config.housing)?;
    let actor = Actor::new(args.actor, Role::Staff);

    let readings: Vec<MeterReading> = MeterReadingImporter::from_path(&args.csv)?
        .into_iter()
        .filter(|reading| args.period.map_or(true, |period| reading.period == period))
        .collect();
    println!(
        "Importing {} meter readings from {}",
        readings.len(),
        args.csv.display()
    );

    record_readings(&ledger, &actor, readings)
}

/// Record every reading, reporting each outcome. Fails if any reading was not recorded.
fn record_readings<S, P>(
    ledger: &HousingLedger<S, P>,
    actor: &Actor,
    readings: Vec<MeterReading>,
) -> Result<(), AppError>
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let total = readings.len();
    let mut rejected = 0usize;
    for reading in readings {
        let room = reading.room_id.clone();
        let period = reading.period;
        match ledger.record_meter_reading(actor, reading) {
            Ok(recorded) => {
                let bill = &recorded.detail.bill;
                println!(
                    "- {room} {period}: {} kWh / {} m3 -> {} VND across {} occupants",
                    bill.electricity_consumed,
                    bill.water_consumed,
                    bill.total,
                    recorded.detail.shares.len()
                );
            }
            Err(err) => {
                rejected += 1;
                println!("- {room} {period}: skipped ({err})");
            }
        }
    }

    if rejected > 0 {
        return Err(AppError::ReadingsRejected { rejected, total });
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let move_in = args.move_in.unwrap_or_else(|| Local::now().date_naive());
    let contract_months = args
        .contract_months
        .unwrap_or(ContractPolicy::DEFAULT_MONTHS);
    let ledger = open_ledger(&HousingConfig {
        data_path: None,
        contract_months,
    })?;
    let admin = Actor::new("demo-admin", Role::Admin);

    println!("Dormitory allocation demo (move-in {move_in}, {contract_months}-month contracts)");
    for (id, room_type, beds, rate) in [
        ("A101", RoomType::Female, 4, 1_000_000),
        ("A102", RoomType::Female, 2, 1_400_000),
        ("B201", RoomType::Male, 4, 900_000),
    ] {
        ledger.add_room(
            &admin,
            RoomSpec {
                id: RoomId(id.to_string()),
                room_type,
                capacity: beds,
                monthly_rate: rate,
                bed_ids: (1..=beds).map(|n| BedId(format!("{id}-{n}"))).collect(),
            },
        )?;
    }
    ledger.add_price_entry(
        &admin,
        PriceDraft {
            effective_from: BillingPeriod::containing(move_in).first_day(),
            effective_to: None,
            electricity_unit_price: 3_500,
            water_unit_price: 15_000,
        },
    )?;

    let students = [
        ("sv-0001", RoomType::Female),
        ("sv-0002", RoomType::Female),
        ("sv-0003", RoomType::Male),
    ];
    for (student, room_type) in students {
        let registration = ledger.submit_registration(
            &Actor::new(student, Role::Student),
            RegistrationRequest {
                student_id: StudentId(student.to_string()),
                room_type,
                requested_move_in: move_in,
            },
        )?;

        let candidates = ledger.find_available(room_type, move_in)?;
        let Some((room, bed)) = candidates.first().and_then(|entry| {
            entry
                .free_beds
                .first()
                .map(|bed| (entry.room.id.clone(), bed.id.clone()))
        }) else {
            println!("- {student}: no {} bed available", room_type.label());
            continue;
        };

        let outcome = ledger.approve_registration(&admin, &registration.id, &room, &bed)?;
        println!(
            "\n- {student} -> {room}/{bed}, contract until {}",
            outcome
                .registration
                .contract_end
                .map(|end| end.to_string())
                .unwrap_or_default()
        );
        if let Some(rent) = &outcome.payment.rent {
            render_breakdown(rent);
        }
    }

    let transfer = ledger.submit_transfer(
        &Actor::new("sv-0002", Role::Student),
        TransferSubmission {
            student_id: StudentId("sv-0002".to_string()),
            requested_room_id: RoomId("A101".to_string()),
            reason: "share a room with a classmate".to_string(),
        },
    );
    match transfer {
        Ok(transfer) => {
            let target = BedId("A101-4".to_string());
            match ledger.approve_transfer(&admin, &transfer.id, &target) {
                Ok(moved) => println!(
                    "\nTransfer {}: {} moved from {} to {}",
                    moved.id, moved.student_id, moved.current_room_id, moved.requested_room_id
                ),
                Err(err) => println!("\nTransfer not approved: {err}"),
            }
        }
        Err(err) => println!("\nTransfer not submitted: {err}"),
    }

    let period = BillingPeriod::containing(move_in);
    for room in ["A101", "B201"] {
        let reading = MeterReading {
            room_id: RoomId(room.to_string()),
            period,
            prior_electricity: 1_000,
            new_electricity: 1_137,
            prior_water: 50,
            new_water: 58,
        };
        let recorded = ledger.record_meter_reading(&admin, reading)?;
        println!(
            "\nUtility bill {} for {room} ({period}): {} VND",
            recorded.detail.id, recorded.detail.bill.total
        );
        for share in &recorded.detail.shares {
            println!("  - {}: {} VND", share.student_id, share.amount);
        }
    }

    Ok(())
}

fn render_breakdown(breakdown: &RentBreakdown) {
    for row in &breakdown.months {
        println!(
            "  {} (from day {}, threshold {}): {}",
            row.month, row.start_day, row.day_threshold, row.formula
        );
    }
    println!(
        "  Total: {} months, {} VND",
        breakdown.total_months, breakdown.total_amount
    );
}
