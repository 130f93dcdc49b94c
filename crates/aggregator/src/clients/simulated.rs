use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Months, NaiveDate};
use rand::Rng;
use registration_core::config::{LatencyRange, SimulationConfig};
use registration_core::models::{
    AcademicRecord, BillingAccount, HousingAssignment, LibraryAccount, RegistrationRequest,
    Subsystem, SubsystemResponse,
};
use registration_core::traits::{Clock, InvocationContext, SubsystemClient};
use registration_core::{RegistrationError, RegistrationResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const BASE_TUITION: f64 = 30000.0;
const MISCELLANEOUS_FEES: f64 = 5000.0;
const ROOMMATE_FIRST_NAMES: [&str; 6] = ["Alex", "Jordan", "Taylor", "Morgan", "Casey", "Riley"];
const ROOMMATE_LAST_NAMES: [&str; 6] = ["Smith", "Johnson", "Williams", "Brown", "Davis", "Miller"];
const BASE_LIBRARY_SERVICES: [&str; 5] = [
    "Book Borrowing",
    "Digital Resources",
    "Study Rooms",
    "Computer Lab Access",
    "Printing Services",
];
const UPPER_YEAR_LIBRARY_SERVICES: [&str; 2] = ["Research Database Access", "Interlibrary Loan"];

/// 按插入顺序淘汰的幂等结果缓存
struct ResponseCache {
    entries: HashMap<String, SubsystemResponse>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &str) -> Option<&SubsystemResponse> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, response: SubsystemResponse) {
        if self.entries.insert(key.clone(), response).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 进程内模拟的下游子系统
///
/// 延迟与失败率来自配置，时间戳取自注入的时钟。同一幂等键的重复调用
/// 直接返回首次成功的结果，不会再次产生副作用。缓存条数有上限，
/// 超出后最早的结果被淘汰。
pub struct SimulatedSubsystemClient {
    subsystem: Subsystem,
    latency: LatencyRange,
    failure_rate: f64,
    clock: Arc<dyn Clock>,
    completed: Mutex<ResponseCache>,
}

impl SimulatedSubsystemClient {
    pub fn new(subsystem: Subsystem, config: &SimulationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            subsystem,
            latency: config.latency_for(subsystem),
            failure_rate: config.failure_rate,
            clock,
            completed: Mutex::new(ResponseCache::new(config.idempotency_cache_capacity)),
        }
    }

    /// 当前缓存的幂等结果条数
    pub async fn cached_responses(&self) -> usize {
        self.completed.lock().await.len()
    }

    /// 四个子系统各一个客户端
    pub fn all(config: &SimulationConfig, clock: Arc<dyn Clock>) -> Vec<Arc<dyn SubsystemClient>> {
        [
            Subsystem::Academic,
            Subsystem::Housing,
            Subsystem::Billing,
            Subsystem::Library,
        ]
        .into_iter()
        .map(|subsystem| {
            Arc::new(Self::new(subsystem, config, clock.clone())) as Arc<dyn SubsystemClient>
        })
        .collect()
    }

    fn sample_latency(&self) -> Duration {
        let LatencyRange { min_ms, max_ms } = self.latency;
        let millis = if max_ms <= min_ms {
            min_ms
        } else {
            rand::rng().random_range(min_ms..=max_ms)
        };
        Duration::from_millis(millis)
    }

    fn should_fail(&self) -> bool {
        self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate.min(1.0))
    }

    fn build_response(&self, request: &RegistrationRequest) -> SubsystemResponse {
        let now = self.clock.now();
        let today = now.date_naive();
        let year_level = request.year_level.as_deref();
        let mut rng = rand::rng();

        match self.subsystem {
            Subsystem::Academic => SubsystemResponse::Academic(AcademicRecord {
                student_id: request.student_id.clone(),
                student_name: request.student_name.clone(),
                program: request.program.clone(),
                enrollment_status: "ENROLLED".to_string(),
                academic_level: request.year_level.clone(),
                gpa: (rng.random_range(2.0..4.0_f64) * 100.0).round() / 100.0,
                advisor_name: advisor_for(&request.program).to_string(),
                enrolled_at: now,
            }),
            Subsystem::Housing => {
                let floor: u32 = rng.random_range(1..=5);
                let room: u32 = rng.random_range(1..=20);
                let roommate = format!(
                    "{} {}",
                    ROOMMATE_FIRST_NAMES[rng.random_range(0..ROOMMATE_FIRST_NAMES.len())],
                    ROOMMATE_LAST_NAMES[rng.random_range(0..ROOMMATE_LAST_NAMES.len())]
                );
                SubsystemResponse::Housing(HousingAssignment {
                    student_id: request.student_id.clone(),
                    room_assignment: format!("{floor}{room:02}"),
                    dormitory_building: dormitory_for(&request.program).to_string(),
                    room_type: "Double Occupancy".to_string(),
                    move_in_date: days_after(today, 14),
                    floor_number: floor.to_string(),
                    roommate_name: roommate,
                    housing_status: "ASSIGNED".to_string(),
                })
            }
            Subsystem::Billing => {
                let tuition = tuition_for(year_level);
                let total = tuition + MISCELLANEOUS_FEES;
                SubsystemResponse::Billing(BillingAccount {
                    student_id: request.student_id.clone(),
                    tuition_fee: tuition,
                    miscellaneous_fees: MISCELLANEOUS_FEES,
                    total_fee_amount: total,
                    payment_deadline: days_after(today, 30),
                    account_status: "ACTIVE".to_string(),
                    amount_paid: 0.0,
                    balance_remaining: total,
                    payment_plan: "Full Payment or Installment Available".to_string(),
                })
            }
            Subsystem::Library => SubsystemResponse::Library(LibraryAccount {
                student_id: request.student_id.clone(),
                library_card_number: format!("LIB-{}", request.student_id.replace('-', "")),
                account_status: "ACTIVE".to_string(),
                expiration_date: today.checked_add_months(Months::new(12)).unwrap_or(today),
                max_books_allowed: max_books_for(year_level),
                current_books_checked_out: 0,
                available_services: services_for(year_level),
                outstanding_fines: 0.0,
                access_level: "UNDERGRADUATE".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SubsystemClient for SimulatedSubsystemClient {
    fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    async fn invoke(
        &self,
        request: &RegistrationRequest,
        ctx: &InvocationContext,
    ) -> RegistrationResult<SubsystemResponse> {
        let cached = self.completed.lock().await.get(&ctx.idempotency_key).cloned();
        if let Some(previous) = cached {
            debug!(
                "{} 已处理过幂等键 {}，返回既有结果 (attempt: {})",
                self.subsystem, ctx.idempotency_key, ctx.attempt
            );
            return Ok(previous);
        }

        let latency = self.sample_latency();
        tokio::select! {
            _ = ctx.cancellation.cancelled() => {
                debug!("{} 调用在 {:?} 内被取消", self.subsystem, latency);
                return Err(RegistrationError::Timeout(format!(
                    "{} 调用已被取消",
                    self.subsystem
                )));
            }
            _ = tokio::time::sleep(latency) => {}
        }

        if self.should_fail() {
            warn!("{} 模拟故障: 学生 {}", self.subsystem, request.student_id);
            return Err(RegistrationError::subsystem_unavailable(
                self.subsystem,
                "simulated outage",
            ));
        }

        let response = self.build_response(request);
        self.completed
            .lock()
            .await
            .insert(ctx.idempotency_key.clone(), response.clone());

        info!(
            "{} 处理完成: 学生 {} 耗时 {}ms",
            self.subsystem,
            request.student_id,
            latency.as_millis()
        );
        Ok(response)
    }
}

fn days_after(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}

/// 按专业分配导师
pub fn advisor_for(program: &str) -> &'static str {
    match program.trim().to_lowercase().as_str() {
        "computer science" => "Dr. Alan Turing",
        "business administration" => "Prof. Peter Drucker",
        "engineering" => "Dr. Nikola Tesla",
        "nursing" => "Dr. Florence Nightingale",
        "education" => "Prof. John Dewey",
        "liberal arts" => "Dr. Martha Nussbaum",
        _ => "Dr. General Advisor",
    }
}

/// 按专业分配宿舍楼
pub fn dormitory_for(program: &str) -> &'static str {
    let program = program.to_lowercase();
    if program.contains("engineering") || program.contains("computer") {
        "Tech Hall"
    } else if program.contains("business") || program.contains("management") {
        "Commerce Building"
    } else if program.contains("arts") || program.contains("humanities") {
        "Liberal Arts Residence"
    } else {
        "Main Campus Dormitory"
    }
}

/// 按年级计算学费，高年级依次上浮5%
pub fn tuition_for(year_level: Option<&str>) -> f64 {
    let multiplier = match year_level.map(|y| y.trim().to_lowercase()).as_deref() {
        Some("2") | Some("second year") => 1.05,
        Some("3") | Some("third year") => 1.10,
        Some("4") | Some("fourth year") => 1.15,
        _ => 1.0,
    };
    (BASE_TUITION * multiplier).round()
}

fn is_first_year_level(level: &str) -> bool {
    level.contains("first") || level == "1"
}

pub fn max_books_for(year_level: Option<&str>) -> u32 {
    let level = year_level.unwrap_or_default().trim().to_lowercase();
    if is_first_year_level(&level) {
        5
    } else if level.contains("second") || level == "2" {
        7
    } else if level.contains("third") || level == "3" {
        10
    } else {
        12
    }
}

/// 新生只开通基础服务
pub fn services_for(year_level: Option<&str>) -> Vec<String> {
    let level = year_level.unwrap_or_default().trim().to_lowercase();
    let base = BASE_LIBRARY_SERVICES.iter();
    if is_first_year_level(&level) {
        base.map(|s| s.to_string()).collect()
    } else {
        base.chain(UPPER_YEAR_LIBRARY_SERVICES.iter())
            .map(|s| s.to_string())
            .collect()
    }
}
