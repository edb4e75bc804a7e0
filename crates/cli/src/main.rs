use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use clinic_core::config::{busy_timeout_from_env_value, database_path_from_env_value};
use clinic_core::models::{
    CancelOutcome, ConsultationSubmission, DispenseOutcome, NewDoctor, NewPatient, Operator,
    PaymentOutcome, PrescriptionLine, Registration, RegistrationRequest, ScheduleRequest,
};
use clinic_core::types::{
    DeptId, DoctorId, FeeFilter, MedId, PatientId, RegId, ScheduleId, Shift, SlotStatus,
};
use clinic_core::{ClinicService, CoreConfig, Money, NonEmptyText, TimeSlot};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic front-desk administration CLI")]
struct Cli {
    /// SQLite database file (defaults to CLINIC_DB_PATH, then clinic.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,
    /// Add a department
    AddDepartment { name: String },
    /// List departments
    Departments,
    /// Add a doctor to a department
    AddDoctor {
        name: String,
        dept_id: i64,
        /// Registration fee, e.g. 15.00
        #[arg(long, default_value = "0")]
        fee: Money,
        #[arg(long)]
        title: Option<String>,
    },
    /// Enable or disable bookings for a doctor
    SetDoctorActive {
        doctor_id: i64,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// List doctors accepting bookings
    Doctors,
    /// Add a patient and print their medical record number
    AddPatient {
        name: String,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        age: Option<i64>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        allergy: Option<String>,
    },
    /// Find a patient by medical record number or exact name
    FindPatient { keyword: String },
    /// Add a medicine to the catalogue
    AddMedicine {
        name: String,
        price: Money,
        stock: i64,
    },
    /// Adjust a medicine's stock by a signed amount
    Restock {
        med_id: i64,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// List the medicine catalogue
    Medicines,
    /// Define or redefine a doctor's slot capacity
    Schedule {
        doctor_id: i64,
        date: NaiveDate,
        /// HH:MM-HH:MM
        time_slot: TimeSlot,
        /// Inferred from the time slot when omitted
        #[arg(long)]
        shift: Option<Shift>,
        #[arg(long, default_value_t = clinic_core::constants::DEFAULT_MAX_SLOTS)]
        max_slots: i64,
        /// Create the slot closed to bookings
        #[arg(long)]
        suspended: bool,
    },
    /// Open or suspend an existing slot
    SlotStatus { schedule_id: i64, status: SlotStatus },
    /// List slots for a date
    Schedules { date: NaiveDate },
    /// Book a registration
    Register {
        patient_id: i64,
        doctor_id: i64,
        date: NaiveDate,
        time_slot: TimeSlot,
        #[arg(long)]
        dept_id: Option<i64>,
        #[arg(long)]
        shift: Option<Shift>,
    },
    /// Cancel a registration
    Cancel {
        reg_id: i64,
        #[arg(long, default_value = "cli")]
        operator: String,
    },
    /// Restore a cancelled registration
    Restore {
        reg_id: i64,
        #[arg(long, default_value = "cli")]
        operator: String,
    },
    /// Call a patient into the consulting room
    StartConsult { reg_id: i64 },
    /// Record a diagnosis and prescriptions
    Submit {
        reg_id: i64,
        diagnosis: String,
        #[arg(long)]
        complaint: Option<String>,
        /// Prescription line as MED_ID:QUANTITY, repeatable
        #[arg(long = "line", value_parser = parse_line)]
        lines: Vec<PrescriptionLine>,
    },
    /// Take payment for a registration
    Pay { reg_id: i64 },
    /// Show what a registration owes
    Bill { reg_id: i64 },
    /// List a day's registrations with fees, for the cashier
    Cashier {
        date: NaiveDate,
        /// all, paid or unpaid
        #[arg(long, default_value = "all")]
        status: FeeFilter,
    },
    /// Dispense one prescription line
    Dispense { reg_id: i64, med_id: i64 },
    /// List paid prescriptions awaiting the pharmacy
    Pending,
    /// Show a doctor's waiting queue
    Queue { doctor_id: i64, date: NaiveDate },
    /// Show recent cancel and restore operations
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn parse_line(value: &str) -> Result<PrescriptionLine, String> {
    let (med, qty) = value
        .split_once(':')
        .ok_or_else(|| format!("expected MED_ID:QUANTITY, got '{value}'"))?;
    let med_id = med
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid medicine id '{med}'"))?;
    let quantity = qty
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid quantity '{qty}'"))?;
    Ok(PrescriptionLine::new(MedId(med_id), quantity))
}

fn print_registration(reg: &Registration) {
    println!(
        "Registration {}: patient {}, doctor {}, {} {} {}, queue #{}, {} / {}",
        reg.reg_id,
        reg.patient_id,
        reg.doctor_id,
        reg.visit_date,
        reg.shift,
        reg.time_slot,
        reg.queue_num,
        reg.visit_status,
        reg.fee_status
    );
}

fn cli_operator(name: String) -> Operator {
    Operator::new(None, name, "ADMIN")
}

fn run(service: &ClinicService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            let version = service.database().migrate()?;
            println!("Database schema at version {}", version);
        }
        Commands::AddDepartment { name } => {
            let dept = service.add_department(&NonEmptyText::new(name)?)?;
            println!("Added department {} ({})", dept.name, dept.dept_id);
        }
        Commands::Departments => {
            for dept in service.departments()? {
                println!("{}: {}", dept.dept_id, dept.name);
            }
        }
        Commands::AddDoctor {
            name,
            dept_id,
            fee,
            title,
        } => {
            let doctor = service.add_doctor(&NewDoctor {
                name: NonEmptyText::new(name)?,
                title,
                dept_id: DeptId(dept_id),
                reg_fee: fee,
            })?;
            println!("Added doctor {} ({})", doctor.name, doctor.doctor_id);
        }
        Commands::SetDoctorActive { doctor_id, active } => {
            service.set_doctor_active(DoctorId(doctor_id), active)?;
            println!("Doctor {} active: {}", doctor_id, active);
        }
        Commands::Doctors => {
            for doctor in service.doctors()? {
                println!(
                    "{}: {} (department {}, fee {})",
                    doctor.doctor_id, doctor.name, doctor.dept_id, doctor.reg_fee
                );
            }
        }
        Commands::AddPatient {
            name,
            gender,
            age,
            phone,
            allergy,
        } => {
            let patient = service.add_patient(&NewPatient {
                name,
                gender,
                age,
                phone,
                allergy,
            })?;
            println!(
                "Added patient {} ({}), record {}",
                patient.name, patient.patient_id, patient.medical_record_no
            );
        }
        Commands::FindPatient { keyword } => match service.find_patient(&keyword)? {
            Some(patient) => println!(
                "{}: {} (record {})",
                patient.patient_id, patient.name, patient.medical_record_no
            ),
            None => println!("No patient matches '{}'", keyword),
        },
        Commands::AddMedicine { name, price, stock } => {
            let medicine = service.add_medicine(&NonEmptyText::new(name)?, price, stock)?;
            println!(
                "Added medicine {} ({}) at {}, stock {}",
                medicine.name, medicine.med_id, medicine.price, medicine.stock
            );
        }
        Commands::Restock { med_id, delta } => {
            let stock = service.adjust_stock(MedId(med_id), delta)?;
            println!("Medicine {} stock now {}", med_id, stock);
        }
        Commands::Medicines => {
            for m in service.medicines()? {
                println!("{}: {} at {}, stock {}", m.med_id, m.name, m.price, m.stock);
            }
        }
        Commands::Schedule {
            doctor_id,
            date,
            time_slot,
            shift,
            max_slots,
            suspended,
        } => {
            let shift = shift.unwrap_or_else(|| Shift::from_time_slot(&time_slot));
            let slot = service.upsert_schedule(&ScheduleRequest {
                doctor_id: DoctorId(doctor_id),
                date,
                time_slot,
                shift,
                max_slots,
                status: if suspended {
                    SlotStatus::Suspended
                } else {
                    SlotStatus::Available
                },
            })?;
            println!(
                "Schedule {}: {}/{} booked, {}",
                slot.schedule_id, slot.booked_slots, slot.max_slots, slot.status
            );
        }
        Commands::SlotStatus {
            schedule_id,
            status,
        } => {
            let slot = service.set_schedule_status(ScheduleId(schedule_id), status)?;
            println!("Schedule {} is {}", slot.schedule_id, slot.status);
        }
        Commands::Schedules { date } => {
            let slots = service.schedules_for_date(date)?;
            if slots.is_empty() {
                println!("No slots defined for {}", date);
            }
            for s in slots {
                println!(
                    "{}: doctor {} {} {} {}/{} {}",
                    s.schedule_id,
                    s.doctor_id,
                    s.shift,
                    s.time_slot,
                    s.booked_slots,
                    s.max_slots,
                    s.status
                );
            }
        }
        Commands::Register {
            patient_id,
            doctor_id,
            date,
            time_slot,
            dept_id,
            shift,
        } => {
            let reg = service.create_registration(&RegistrationRequest {
                patient_id: PatientId(patient_id),
                doctor_id: DoctorId(doctor_id),
                dept_id: dept_id.map(DeptId),
                visit_date: date,
                time_slot,
                shift,
            })?;
            print_registration(&reg);
        }
        Commands::Cancel { reg_id, operator } => {
            match service.cancel_registration(RegId(reg_id), &cli_operator(operator))? {
                CancelOutcome::Cancelled { refunded, .. } => {
                    println!("Cancelled registration {}", reg_id);
                    if refunded {
                        println!("Fee marked REFUNDED; return the payment to the patient");
                    }
                }
                CancelOutcome::AlreadyCancelled => {
                    println!("Registration {} was already cancelled", reg_id)
                }
            }
        }
        Commands::Restore { reg_id, operator } => {
            service.restore_registration(RegId(reg_id), &cli_operator(operator))?;
            println!("Restored registration {}", reg_id);
        }
        Commands::StartConsult { reg_id } => {
            let status = service.start_consultation(RegId(reg_id))?;
            println!("Registration {} is {}", reg_id, status);
        }
        Commands::Submit {
            reg_id,
            diagnosis,
            complaint,
            lines,
        } => {
            let prescriptions = service.submit_consultation(
                RegId(reg_id),
                &ConsultationSubmission {
                    main_complaint: complaint,
                    diagnosis: NonEmptyText::new(diagnosis)?,
                    lines,
                },
            )?;
            println!(
                "Consultation recorded for registration {} with {} prescription(s)",
                reg_id,
                prescriptions.len()
            );
        }
        Commands::Pay { reg_id } => match service.pay_registration(RegId(reg_id))? {
            PaymentOutcome::Paid { paid_time } => {
                println!("Registration {} paid at {}", reg_id, paid_time.to_rfc3339())
            }
            PaymentOutcome::AlreadyPaid => println!("Registration {} was already paid", reg_id),
        },
        Commands::Bill { reg_id } => {
            let bill = service.bill(RegId(reg_id))?;
            println!(
                "Registration {} ({}): registration {} + check {} + medicine {} = {}",
                bill.reg_id, bill.fee_status, bill.reg_fee, bill.check_fee, bill.med_fee, bill.total
            );
        }
        Commands::Cashier { date, status } => {
            let sheet = service.day_sheet(date, status)?;
            for r in &sheet.rows {
                println!(
                    "{} #{:<3} {} ({}) with {} [{} / {}]: {}",
                    r.time_slot,
                    r.queue_num,
                    r.patient_name,
                    r.medical_record_no,
                    r.doctor_name,
                    r.visit_status,
                    r.fee_status,
                    r.total
                );
            }
            println!("{} registration(s), {} due on {}", sheet.count, sheet.amount, date);
        }
        Commands::Dispense { reg_id, med_id } => {
            match service.dispense(RegId(reg_id), MedId(med_id))? {
                DispenseOutcome::Dispensed {
                    quantity,
                    remaining_stock,
                } => println!(
                    "Dispensed {} of medicine {}; {} left in stock",
                    quantity, med_id, remaining_stock
                ),
                DispenseOutcome::AlreadyDispensed => {
                    println!("Medicine {} was already dispensed", med_id)
                }
            }
        }
        Commands::Pending => {
            let pending = service.pending_dispense()?;
            if pending.is_empty() {
                println!("Nothing waiting at the pharmacy.");
            }
            for p in pending {
                println!(
                    "Registration {} {} ({}): {} x{} [{}]",
                    p.reg_id,
                    p.patient_name,
                    p.medical_record_no,
                    p.med_name,
                    p.total_quantity,
                    p.total_amount
                );
            }
        }
        Commands::Queue { doctor_id, date } => {
            for reg in service.doctor_queue(DoctorId(doctor_id), date)? {
                print_registration(&reg);
            }
        }
        Commands::Audit { limit } => {
            for e in service.audit_log(limit)? {
                println!(
                    "{} {} by {} ({}) on {}: {}",
                    e.created_at.to_rfc3339(),
                    e.op_type,
                    e.operator_name,
                    e.operator_role,
                    e.target_id,
                    e.detail
                );
            }
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'clinic --help' for commands");
        return Ok(());
    };

    let database_path = cli
        .db
        .unwrap_or_else(|| database_path_from_env_value(std::env::var("CLINIC_DB_PATH").ok()));
    let cfg = Arc::new(CoreConfig::new(
        database_path,
        busy_timeout_from_env_value(std::env::var("CLINIC_BUSY_TIMEOUT_MS").ok())?,
    )?);
    let service = ClinicService::new(cfg);

    if !matches!(command, Commands::Migrate) {
        service.database().verify_schema()?;
    }

    run(&service, command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> ClinicService {
        let cfg = Arc::new(
            CoreConfig::new(dir.path().join("clinic.db"), Duration::from_secs(5))
                .expect("CoreConfig::new should succeed"),
        );
        ClinicService::new(cfg)
    }

    fn command(args: &[&str]) -> Commands {
        let mut argv = vec!["clinic"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)
            .expect("arguments should parse")
            .command
            .expect("a subcommand should be present")
    }

    #[test]
    fn test_prescription_lines_parse() {
        assert_eq!(
            parse_line("3:2").expect("line should parse"),
            PrescriptionLine::new(MedId(3), 2)
        );
        assert!(parse_line("3").is_err());
        assert!(parse_line("x:2").is_err());
    }

    #[test]
    fn test_restock_accepts_negative_delta() {
        match command(&["restock", "4", "-2"]) {
            Commands::Restock { med_id, delta } => {
                assert_eq!(med_id, 4);
                assert_eq!(delta, -2);
            }
            _ => panic!("expected restock"),
        }
    }

    #[test]
    fn test_cashier_status_defaults_to_all() {
        match command(&["cashier", "2025-05-06"]) {
            Commands::Cashier { status, .. } => assert_eq!(status, FeeFilter::All),
            _ => panic!("expected cashier"),
        }
        match command(&["cashier", "2025-05-06", "--status", "unpaid"]) {
            Commands::Cashier { status, .. } => assert_eq!(status, FeeFilter::Unpaid),
            _ => panic!("expected cashier"),
        }
    }

    #[test]
    fn test_commands_drive_a_booking() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&dir);

        for args in [
            vec!["migrate"],
            vec!["add-department", "Paediatrics"],
            vec!["add-doctor", "Dr Wu", "1", "--fee", "20.00"],
            vec!["add-patient", "Li Si"],
            vec!["schedule", "1", "2025-05-06", "14:00-15:00", "--max-slots", "2"],
            vec!["register", "1", "1", "2025-05-06", "14:00-15:00"],
            vec!["cashier", "2025-05-06", "--status", "unpaid"],
        ] {
            run(&service, command(&args)).expect("command should succeed");
        }

        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        let slots = service
            .schedules_for_date(date)
            .expect("schedules_for_date should succeed");
        assert_eq!(slots[0].shift, Shift::Afternoon);
        assert_eq!(slots[0].booked_slots, 1);
    }
}
