use super::*;

struct FakeSampleSource(SysinfoSample);

#[async_trait::async_trait]
impl SampleSource for FakeSampleSource {
    async fn sample(&self) -> Result<SysinfoSample, SampleError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn fake_source_round_trips_its_fixed_sample() {
    let fixed = SysinfoSample {
        zones: vec![ZoneSummary { uuid: "u-1".to_string(), name: "global".to_string(), state: "running".to_string(), brand: "joyent".to_string() }],
        zpools: vec![ZpoolCapacity { name: "zones".to_string(), size_bytes: 1000, allocated_bytes: 200, free_bytes: 800 }],
        memory: MemoryCounters { total_bytes: 4096, available_bytes: 2048, arc_size_bytes: 512 },
        disk_usage: vec![DiskUsageEntry { mount: "/".to_string(), used_bytes: 100, available_bytes: 900 }],
        boot_time_ms: 1_700_000_000_000,
    };
    let source = FakeSampleSource(fixed.clone());
    let sampled = source.sample().await.expect("fake source never fails");
    assert_eq!(sampled, fixed);
}

#[test]
fn sample_default_is_empty() {
    let sample = SysinfoSample::default();
    assert!(sample.zones.is_empty());
    assert!(sample.zpools.is_empty());
    assert_eq!(sample.memory, MemoryCounters::default());
}
